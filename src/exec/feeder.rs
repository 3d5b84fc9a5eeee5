/// Stdin delivery for a running phase
///
/// Batch input is written once and the pipe closed so the program sees EOF.
/// Interactive input is forwarded line by line as it is queued and the pipe is
/// closed when the sender side goes away.
use crossbeam_channel::{select, Receiver};
use std::io::{self, Write};
use std::process::{ChildStdin, Stdio};
use std::thread;

/// What the child's stdin is connected to
#[derive(Debug)]
pub enum InputFeed {
    /// `/dev/null`; reads see immediate EOF
    Closed,
    Batch(Vec<u8>),
    Interactive(Receiver<String>),
}

impl InputFeed {
    pub fn stdio(&self) -> Stdio {
        match self {
            InputFeed::Closed => Stdio::null(),
            _ => Stdio::piped(),
        }
    }

    /// Start delivering input on a detached thread.
    ///
    /// The thread stops when all input is written, the child closes its end,
    /// or `phase_done` disconnects because the phase ended.
    pub fn start(self, stdin: Option<ChildStdin>, phase_done: Receiver<()>) -> io::Result<()> {
        let pipe = match (&self, stdin) {
            (InputFeed::Closed, _) => return Ok(()),
            (_, Some(pipe)) => pipe,
            (_, None) => {
                return Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "child stdin pipe missing",
                ))
            }
        };
        let feed = self;

        thread::Builder::new()
            .name("coderun-stdin".to_string())
            .spawn(move || {
                let result = match feed {
                    InputFeed::Batch(data) => write_batch(pipe, &data),
                    InputFeed::Interactive(lines) => forward_lines(pipe, &lines, &phase_done),
                    InputFeed::Closed => Ok(()),
                };
                match result {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                        log::debug!("Child closed stdin before all input was delivered")
                    }
                    Err(e) => log::warn!("Writing child stdin failed: {}", e),
                }
            })?;
        Ok(())
    }
}

fn write_batch(mut pipe: ChildStdin, data: &[u8]) -> io::Result<()> {
    pipe.write_all(data)?;
    pipe.flush()
    // pipe dropped here: EOF
}

fn forward_lines(
    mut pipe: ChildStdin,
    lines: &Receiver<String>,
    phase_done: &Receiver<()>,
) -> io::Result<()> {
    loop {
        select! {
            recv(lines) -> line => match line {
                Ok(line) => {
                    pipe.write_all(line.as_bytes())?;
                    if !line.ends_with('\n') {
                        pipe.write_all(b"\n")?;
                    }
                    pipe.flush()?;
                }
                // Input closed by the caller
                Err(_) => return Ok(()),
            },
            recv(phase_done) -> _ => return Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{bounded, unbounded};
    use std::io::Read;
    use std::process::Command;

    fn cat() -> std::process::Child {
        Command::new("cat")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .unwrap()
    }

    #[test]
    fn batch_input_is_delivered_then_closed() {
        let mut child = cat();
        let (_done_tx, done) = bounded::<()>(0);
        InputFeed::Batch(b"one\ntwo".to_vec())
            .start(child.stdin.take(), done)
            .unwrap();

        let mut out = String::new();
        child.stdout.take().unwrap().read_to_string(&mut out).unwrap();
        assert_eq!(out, "one\ntwo");
        assert!(child.wait().unwrap().success());
    }

    #[test]
    fn interactive_lines_get_newlines_and_eof_on_close() {
        let mut child = cat();
        let (_done_tx, done) = bounded::<()>(0);
        let (lines_tx, lines) = unbounded();
        InputFeed::Interactive(lines)
            .start(child.stdin.take(), done)
            .unwrap();

        lines_tx.send("1".to_string()).unwrap();
        lines_tx.send("2\n".to_string()).unwrap();
        drop(lines_tx);

        let mut out = String::new();
        child.stdout.take().unwrap().read_to_string(&mut out).unwrap();
        assert_eq!(out, "1\n2\n");
        child.wait().unwrap();
    }

    #[test]
    fn interactive_feeder_stops_when_phase_ends() {
        let mut child = cat();
        let (done_tx, done) = bounded::<()>(0);
        let (_lines_tx, lines) = unbounded::<String>();
        InputFeed::Interactive(lines)
            .start(child.stdin.take(), done)
            .unwrap();

        drop(done_tx);
        let mut out = String::new();
        child.stdout.take().unwrap().read_to_string(&mut out).unwrap();
        assert_eq!(out, "");
        child.wait().unwrap();
    }

    #[test]
    fn pending_input_without_a_pipe_is_an_error() {
        let (_done_tx, done) = bounded::<()>(0);
        let err = InputFeed::Batch(b"lost".to_vec()).start(None, done).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);

        let (_done_tx, done) = bounded::<()>(0);
        assert!(InputFeed::Closed.start(None, done).is_ok());
    }

    #[test]
    fn closed_feed_uses_null_stdin() {
        let mut child = Command::new("cat")
            .stdin(InputFeed::Closed.stdio())
            .stdout(Stdio::piped())
            .spawn()
            .unwrap();
        assert!(child.stdin.is_none());
        let mut out = String::new();
        child.stdout.take().unwrap().read_to_string(&mut out).unwrap();
        assert!(out.is_empty());
        child.wait().unwrap();
    }
}
