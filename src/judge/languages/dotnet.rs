use crate::judge::profile::{CommandTemplate, LanguageProfile, SourceNaming};
use std::time::Duration;

pub fn profiles() -> Vec<LanguageProfile> {
    vec![LanguageProfile {
        name: "csharp",
        display_name: "C#",
        aliases: &["cs", "c#"],
        source: SourceNaming::Fixed("main.cs"),
        compile: Some(CommandTemplate::new("mcs", &["-optimize+", "-out:main.exe", "{source}"])),
        run: CommandTemplate::new("mono", &["{dir}/main.exe"]),
        compile_timeout: Duration::from_secs(45),
        run_timeout: Duration::from_secs(15),
        environment: &[],
        missing_hint: "Install Mono (mcs and mono), e.g. `apt install mono-complete`.",
    }]
}
