//! Language profiles: how one language is compiled and run
//!
//! Command templates are plain argument lists. Placeholders are substituted
//! per argument, never joined into a shell string:
//!
//! - `{dir}`: absolute workspace path
//! - `{source}`: source file name inside the workspace
//! - `{stem}`: source file name without extension
use crate::safety::workspace::Workspace;
use std::path::Path;
use std::time::Duration;

/// How the source file inside the workspace is named
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceNaming {
    /// Always the same file name
    Fixed(&'static str),
    /// Named after the first `public class` in the source (Java style)
    PublicClass {
        fallback: &'static str,
        extension: &'static str,
    },
}

/// Program plus argument templates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandTemplate {
    pub program: &'static str,
    pub args: &'static [&'static str],
}

impl CommandTemplate {
    pub const fn new(program: &'static str, args: &'static [&'static str]) -> Self {
        Self { program, args }
    }

    /// True when the program is a host toolchain, as opposed to an artifact
    /// built inside the workspace.
    pub fn is_toolchain(&self) -> bool {
        !self.program.contains('{')
    }
}

/// A command ready to spawn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    /// Program is a host toolchain; absence means a missing toolchain
    pub toolchain: bool,
}

impl PreparedCommand {
    /// argv rendered for logs
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Registry entry describing one language
#[derive(Debug, Clone)]
pub struct LanguageProfile {
    /// Canonical lowercase identifier
    pub name: &'static str,
    pub display_name: &'static str,
    /// Extra identifiers accepted by the registry, lowercase
    pub aliases: &'static [&'static str],
    pub source: SourceNaming,
    pub compile: Option<CommandTemplate>,
    pub run: CommandTemplate,
    pub compile_timeout: Duration,
    pub run_timeout: Duration,
    /// Extra environment, values may use placeholders
    pub environment: &'static [(&'static str, &'static str)],
    /// Remediation shown when a toolchain executable is missing
    pub missing_hint: &'static str,
}

impl LanguageProfile {
    pub fn is_compiled(&self) -> bool {
        self.compile.is_some()
    }

    /// All identifiers this profile answers to
    pub fn identifiers(&self) -> impl Iterator<Item = &'static str> + '_ {
        std::iter::once(self.name).chain(self.aliases.iter().copied())
    }

    /// File name the source is written to
    pub fn source_filename(&self, code: &str) -> String {
        match self.source {
            SourceNaming::Fixed(name) => name.to_string(),
            SourceNaming::PublicClass {
                fallback,
                extension,
            } => {
                let class = detect_public_class(code).unwrap_or(fallback);
                format!("{class}.{extension}")
            }
        }
    }

    /// Host executables this language needs, compile step first
    pub fn toolchain(&self) -> Vec<&'static str> {
        let mut tools = Vec::new();
        for template in self.compile.iter().chain(std::iter::once(&self.run)) {
            if template.is_toolchain() && !tools.contains(&template.program) {
                tools.push(template.program);
            }
        }
        tools
    }

    pub fn compile_command(&self, workspace: &Workspace) -> Option<PreparedCommand> {
        self.compile.map(|template| self.prepare(&template, workspace))
    }

    pub fn run_command(&self, workspace: &Workspace) -> PreparedCommand {
        self.prepare(&self.run, workspace)
    }

    fn prepare(&self, template: &CommandTemplate, workspace: &Workspace) -> PreparedCommand {
        let dir = workspace.dir().to_string_lossy().into_owned();
        let source = workspace
            .source_file()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = Path::new(&source)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        let expand = |value: &str| {
            value
                .replace("{dir}", &dir)
                .replace("{source}", &source)
                .replace("{stem}", &stem)
        };

        PreparedCommand {
            program: expand(template.program),
            args: template.args.iter().map(|arg| expand(*arg)).collect(),
            env: self
                .environment
                .iter()
                .map(|(key, value)| (key.to_string(), expand(*value)))
                .collect(),
            toolchain: template.is_toolchain(),
        }
    }
}

/// Name of the first `public class`, if it is a plain identifier
fn detect_public_class(code: &str) -> Option<&str> {
    code.lines().find_map(|line| {
        let trimmed = line.trim_start();
        let rest = trimmed
            .strip_prefix("public final class ")
            .or_else(|| trimmed.strip_prefix("public class "))?;
        let name = rest
            .split(|c: char| c.is_whitespace() || c == '{' || c == '<')
            .next()?;
        is_identifier(name).then_some(name)
    })
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' || first == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safety::workspace::WorkspaceManager;

    const JAVA_LIKE: LanguageProfile = LanguageProfile {
        name: "java",
        display_name: "Java",
        aliases: &[],
        source: SourceNaming::PublicClass {
            fallback: "Main",
            extension: "java",
        },
        compile: Some(CommandTemplate::new("javac", &["-encoding", "UTF-8", "{source}"])),
        run: CommandTemplate::new("java", &["-cp", "{dir}", "{stem}"]),
        compile_timeout: Duration::from_secs(30),
        run_timeout: Duration::from_secs(10),
        environment: &[("HOME", "{dir}")],
        missing_hint: "Install a JDK.",
    };

    #[test]
    fn public_class_names_the_source_file() {
        let code = "import java.util.*;\n\npublic class Solver {\n}\n";
        assert_eq!(JAVA_LIKE.source_filename(code), "Solver.java");
    }

    #[test]
    fn falls_back_when_no_public_class() {
        assert_eq!(JAVA_LIKE.source_filename("class Hidden {}"), "Main.java");
    }

    #[test]
    fn rejects_non_identifier_class_names() {
        assert_eq!(detect_public_class("public class ../../x {"), None);
        assert_eq!(detect_public_class("public class Generic<T> {"), Some("Generic"));
    }

    #[test]
    fn placeholders_expand_per_argument() {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path().to_path_buf()).unwrap();
        let mut workspace = manager.acquire().unwrap();
        workspace.materialize("Solver.java", b"public class Solver {}").unwrap();

        let dir = workspace.dir().to_string_lossy().into_owned();
        let compile = JAVA_LIKE.compile_command(&workspace).unwrap();
        assert_eq!(compile.program, "javac");
        assert_eq!(compile.args, vec!["-encoding", "UTF-8", "Solver.java"]);
        assert!(compile.toolchain);

        let run = JAVA_LIKE.run_command(&workspace);
        assert_eq!(run.args, vec!["-cp".to_string(), dir.clone(), "Solver".to_string()]);
        assert_eq!(run.env, vec![("HOME".to_string(), dir)]);
    }

    #[test]
    fn workspace_artifacts_are_not_toolchains() {
        assert!(!CommandTemplate::new("{dir}/main", &[]).is_toolchain());
        assert!(CommandTemplate::new("/usr/bin/env", &[]).is_toolchain());
        assert!(CommandTemplate::new("gcc", &[]).is_toolchain());
    }

    #[test]
    fn toolchain_lists_distinct_programs() {
        assert_eq!(JAVA_LIKE.toolchain(), vec!["javac", "java"]);
    }
}
