use crate::judge::profile::{CommandTemplate, LanguageProfile, SourceNaming};
use std::time::Duration;

// JVM startup is slow; run windows are wider than for native binaries.
pub fn profiles() -> Vec<LanguageProfile> {
    vec![
        LanguageProfile {
            name: "java",
            display_name: "Java",
            aliases: &[],
            source: SourceNaming::PublicClass {
                fallback: "Main",
                extension: "java",
            },
            compile: Some(CommandTemplate::new("javac", &["-encoding", "UTF-8", "{source}"])),
            run: CommandTemplate::new(
                "java",
                &["-Xss64m", "-XX:+UseSerialGC", "-Dfile.encoding=UTF-8", "-cp", "{dir}", "{stem}"],
            ),
            compile_timeout: Duration::from_secs(45),
            run_timeout: Duration::from_secs(15),
            environment: &[],
            missing_hint: "Install a JDK, e.g. `apt install openjdk-17-jdk`.",
        },
        LanguageProfile {
            name: "kotlin",
            display_name: "Kotlin",
            aliases: &["kt"],
            source: SourceNaming::Fixed("main.kt"),
            compile: Some(CommandTemplate::new(
                "kotlinc",
                &["{source}", "-include-runtime", "-d", "main.jar"],
            )),
            run: CommandTemplate::new("java", &["-jar", "{dir}/main.jar"]),
            compile_timeout: Duration::from_secs(120),
            run_timeout: Duration::from_secs(15),
            environment: &[],
            missing_hint: "Install the Kotlin compiler (kotlinc) and a JDK.",
        },
    ]
}
