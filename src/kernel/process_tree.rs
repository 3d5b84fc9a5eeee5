/// Descendant tracking for a phase leader
///
/// A descendant that calls `setsid` or `setpgid` leaves the leader's process
/// group and no longer receives `killpg`. The tracker walks `/proc` while the
/// phase runs and remembers every process whose parent chain leads back to
/// the leader. Entries are keyed by pid and start time so a recycled pid is
/// never signalled.
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::collections::HashMap;
use std::fs;

/// Rounds of scan-then-kill before giving up on a process that keeps forking
const KILL_ROUNDS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ProcStat {
    pid: u32,
    ppid: u32,
    start_time: u64,
    zombie: bool,
}

/// Parse `/proc/<pid>/stat`. The command name may contain spaces and
/// parentheses, so fields are counted from the last `)`.
fn read_stat(pid: u32) -> Option<ProcStat> {
    let raw = fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    parse_stat(pid, &raw)
}

fn parse_stat(pid: u32, raw: &str) -> Option<ProcStat> {
    let (_, rest) = raw.rsplit_once(')')?;
    let fields: Vec<&str> = rest.split_whitespace().collect();
    // fields[0] is stat field 3 (state)
    let state = fields.first()?;
    let ppid = fields.get(1)?.parse().ok()?;
    let start_time = fields.get(19)?.parse().ok()?;
    Some(ProcStat {
        pid,
        ppid,
        start_time,
        zombie: *state == "Z" || *state == "X",
    })
}

fn all_processes() -> Vec<ProcStat> {
    let Ok(entries) = fs::read_dir("/proc") else {
        return Vec::new();
    };
    entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().to_str()?.parse::<u32>().ok())
        .filter_map(read_stat)
        .collect()
}

/// Every process observed below one phase leader
#[derive(Debug)]
pub struct ProcessTree {
    leader: u32,
    /// pid -> start time, leader included
    known: HashMap<u32, u64>,
}

impl ProcessTree {
    pub fn new(leader: u32) -> Self {
        let mut known = HashMap::new();
        if let Some(stat) = read_stat(leader) {
            known.insert(leader, stat.start_time);
        }
        Self { leader, known }
    }

    /// Record descendants that appeared since the last scan. Returns how many
    /// were new.
    pub fn scan(&mut self) -> usize {
        let processes = all_processes();
        self.adopt(&processes)
    }

    fn adopt(&mut self, processes: &[ProcStat]) -> usize {
        let mut added = 0;
        // /proc order is arbitrary; repeat until no parent link is left unresolved
        loop {
            let mut changed = false;
            for stat in processes {
                if self.known.contains_key(&stat.pid) {
                    continue;
                }
                let parent_known = self
                    .known
                    .get(&stat.ppid)
                    .is_some_and(|&parent_start| parent_start <= stat.start_time);
                if parent_known {
                    self.known.insert(stat.pid, stat.start_time);
                    added += 1;
                    changed = true;
                }
            }
            if !changed {
                return added;
            }
        }
    }

    /// Tracked descendants that are still running, leader excluded
    pub fn live_descendants(&self) -> Vec<u32> {
        self.known
            .iter()
            .filter(|&(&pid, _)| pid != self.leader)
            .filter(|&(&pid, &start)| {
                read_stat(pid).is_some_and(|stat| stat.start_time == start && !stat.zombie)
            })
            .map(|(&pid, _)| pid)
            .collect()
    }

    /// Send `signal` to every live tracked descendant. Returns how many were
    /// signalled.
    pub fn signal_descendants(&self, signal: Signal) -> usize {
        self.live_descendants()
            .into_iter()
            .filter(|&pid| match kill(Pid::from_raw(pid as i32), signal) {
                Ok(()) => true,
                Err(Errno::ESRCH) => false,
                Err(e) => {
                    log::warn!("Failed to signal descendant {}: {}", pid, e);
                    false
                }
            })
            .count()
    }

    /// SIGKILL every descendant, rescanning for children forked right before
    /// their parent died. Returns the number of processes killed.
    pub fn kill_descendants(&mut self) -> usize {
        self.scan();
        let mut killed = self.signal_descendants(Signal::SIGKILL);
        for _ in 1..KILL_ROUNDS {
            if self.scan() == 0 {
                break;
            }
            killed += self.signal_descendants(Signal::SIGKILL);
        }
        killed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stat(pid: u32, ppid: u32, start_time: u64) -> ProcStat {
        ProcStat {
            pid,
            ppid,
            start_time,
            zombie: false,
        }
    }

    #[test]
    fn parses_names_with_spaces_and_parens() {
        let raw = "4242 (we ird) (x)) S 17 4242 4242 0 -1 4194560 100 0 0 0 \
                   1 2 0 0 20 0 1 0 987654 1000 50";
        let parsed = parse_stat(4242, raw).unwrap();
        assert_eq!(parsed.ppid, 17);
        assert_eq!(parsed.start_time, 987654);
        assert!(!parsed.zombie);
    }

    #[test]
    fn zombie_state_is_recognised() {
        let raw = "7 (sh) Z 1 7 7 0 -1 0 0 0 0 0 0 0 0 0 20 0 1 0 55 0 0";
        assert!(parse_stat(7, raw).unwrap().zombie);
    }

    #[test]
    fn adopts_grandchildren_listed_before_their_parents() {
        let mut tree = ProcessTree {
            leader: 100,
            known: HashMap::from([(100, 10)]),
        };
        let processes = [stat(300, 200, 30), stat(200, 100, 20), stat(400, 1, 40)];
        assert_eq!(tree.adopt(&processes), 2);
        assert!(tree.known.contains_key(&300));
        assert!(!tree.known.contains_key(&400));
    }

    #[test]
    fn recycled_parent_pid_is_not_followed() {
        let mut tree = ProcessTree {
            leader: 100,
            known: HashMap::from([(100, 10), (200, 20)]),
        };
        // pid 200 was reused by an unrelated process started later
        let processes = [stat(500, 200, 15)];
        assert_eq!(tree.adopt(&processes), 0);
    }

    #[test]
    fn finds_and_kills_a_session_escapee() {
        if crate::utils::toolchain::find_executable("setsid").is_none() {
            return;
        }
        use std::io::{BufRead, BufReader};
        use std::os::unix::process::CommandExt;
        use std::process::{Command, Stdio};

        let mut child = Command::new("sh")
            .arg("-c")
            .arg("setsid sleep 30 & echo $!; wait")
            .stdout(Stdio::piped())
            .process_group(0)
            .spawn()
            .unwrap();
        let mut line = String::new();
        BufReader::new(child.stdout.take().unwrap())
            .read_line(&mut line)
            .unwrap();
        let escapee: u32 = line.trim().parse().unwrap();

        let mut tree = ProcessTree::new(child.id());
        tree.scan();
        assert!(tree.live_descendants().contains(&escapee));

        assert!(tree.kill_descendants() >= 1);
        child.kill().unwrap();
        child.wait().unwrap();
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
        while read_stat(escapee).is_some_and(|s| !s.zombie) && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert!(read_stat(escapee).map_or(true, |s| s.zombie));
    }
}
