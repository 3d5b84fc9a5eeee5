use crate::judge::profile::{CommandTemplate, LanguageProfile, SourceNaming};
use std::time::Duration;

pub fn profiles() -> Vec<LanguageProfile> {
    vec![
        LanguageProfile {
            name: "python",
            display_name: "Python 3",
            aliases: &["py", "python3"],
            source: SourceNaming::Fixed("main.py"),
            compile: None,
            run: CommandTemplate::new("python3", &["-u", "{source}"]),
            compile_timeout: Duration::from_secs(30),
            run_timeout: Duration::from_secs(10),
            environment: &[("PYTHONDONTWRITEBYTECODE", "1"), ("PYTHONIOENCODING", "utf-8")],
            missing_hint: "Install Python 3, e.g. `apt install python3`.",
        },
        LanguageProfile {
            name: "javascript",
            display_name: "JavaScript (Node.js)",
            aliases: &["js", "node", "nodejs"],
            source: SourceNaming::Fixed("main.js"),
            compile: None,
            run: CommandTemplate::new("node", &["{source}"]),
            compile_timeout: Duration::from_secs(30),
            run_timeout: Duration::from_secs(10),
            environment: &[],
            missing_hint: "Install Node.js from https://nodejs.org.",
        },
        LanguageProfile {
            name: "typescript",
            display_name: "TypeScript",
            aliases: &["ts"],
            source: SourceNaming::Fixed("main.ts"),
            compile: Some(CommandTemplate::new(
                "tsc",
                &["--target", "ES2020", "--module", "commonjs", "--skipLibCheck", "{source}"],
            )),
            run: CommandTemplate::new("node", &["{stem}.js"]),
            compile_timeout: Duration::from_secs(45),
            run_timeout: Duration::from_secs(10),
            environment: &[],
            missing_hint: "Install Node.js and the TypeScript compiler (`npm install -g typescript`).",
        },
        LanguageProfile {
            name: "php",
            display_name: "PHP",
            aliases: &[],
            source: SourceNaming::Fixed("main.php"),
            compile: None,
            run: CommandTemplate::new("php", &["{source}"]),
            compile_timeout: Duration::from_secs(30),
            run_timeout: Duration::from_secs(10),
            environment: &[],
            missing_hint: "Install the PHP CLI, e.g. `apt install php-cli`.",
        },
        LanguageProfile {
            name: "ruby",
            display_name: "Ruby",
            aliases: &["rb"],
            source: SourceNaming::Fixed("main.rb"),
            compile: None,
            run: CommandTemplate::new("ruby", &["{source}"]),
            compile_timeout: Duration::from_secs(30),
            run_timeout: Duration::from_secs(10),
            environment: &[],
            missing_hint: "Install Ruby, e.g. `apt install ruby`.",
        },
    ]
}
