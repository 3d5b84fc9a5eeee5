use crate::judge::profile::{CommandTemplate, LanguageProfile, SourceNaming};
use std::time::Duration;

const RUN_ARTIFACT: CommandTemplate = CommandTemplate::new("{dir}/main", &[]);

pub fn profiles() -> Vec<LanguageProfile> {
    vec![
        LanguageProfile {
            name: "c",
            display_name: "C",
            aliases: &[],
            source: SourceNaming::Fixed("main.c"),
            compile: Some(CommandTemplate::new(
                "gcc",
                &["-std=c11", "-O2", "-pipe", "-o", "main", "{source}", "-lm"],
            )),
            run: RUN_ARTIFACT,
            compile_timeout: Duration::from_secs(30),
            run_timeout: Duration::from_secs(10),
            environment: &[],
            missing_hint: "Install a C compiler, e.g. `apt install gcc`.",
        },
        LanguageProfile {
            name: "cpp",
            display_name: "C++",
            aliases: &["c++", "cxx", "cc"],
            source: SourceNaming::Fixed("main.cpp"),
            compile: Some(CommandTemplate::new(
                "g++",
                &["-std=c++17", "-O2", "-pipe", "-o", "main", "{source}"],
            )),
            run: RUN_ARTIFACT,
            compile_timeout: Duration::from_secs(30),
            run_timeout: Duration::from_secs(10),
            environment: &[],
            missing_hint: "Install a C++ compiler, e.g. `apt install g++`.",
        },
        LanguageProfile {
            name: "go",
            display_name: "Go",
            aliases: &["golang"],
            source: SourceNaming::Fixed("main.go"),
            compile: Some(CommandTemplate::new("go", &["build", "-o", "main", "{source}"])),
            run: RUN_ARTIFACT,
            compile_timeout: Duration::from_secs(60),
            run_timeout: Duration::from_secs(10),
            // Build cache stays inside the workspace so nothing is shared between runs.
            environment: &[
                ("GOCACHE", "{dir}/.cache/go-build"),
                ("GOPATH", "{dir}/.go"),
                ("GO111MODULE", "off"),
            ],
            missing_hint: "Install the Go toolchain from https://go.dev/dl/.",
        },
        LanguageProfile {
            name: "rust",
            display_name: "Rust",
            aliases: &["rs"],
            source: SourceNaming::Fixed("main.rs"),
            compile: Some(CommandTemplate::new(
                "rustc",
                &["--edition", "2021", "-O", "-o", "main", "{source}"],
            )),
            run: RUN_ARTIFACT,
            compile_timeout: Duration::from_secs(60),
            run_timeout: Duration::from_secs(10),
            environment: &[],
            missing_hint: "Install Rust with rustup from https://rustup.rs.",
        },
        LanguageProfile {
            name: "swift",
            display_name: "Swift",
            aliases: &[],
            source: SourceNaming::Fixed("main.swift"),
            compile: Some(CommandTemplate::new("swiftc", &["-O", "-o", "main", "{source}"])),
            run: RUN_ARTIFACT,
            compile_timeout: Duration::from_secs(90),
            run_timeout: Duration::from_secs(10),
            environment: &[("CLANG_MODULE_CACHE_PATH", "{dir}/.cache/clang")],
            missing_hint: "Install the Swift toolchain from https://swift.org/install.",
        },
    ]
}
