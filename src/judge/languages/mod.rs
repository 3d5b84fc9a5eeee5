//! Built-in language tables.
//!
//! Adding a language means adding a [`LanguageProfile`] here; nothing in the
//! orchestration path knows about individual languages.

pub mod dotnet;
pub mod jvm;
pub mod native;
pub mod scripting;

use crate::judge::profile::LanguageProfile;

/// Every profile shipped with the engine
pub fn builtin_profiles() -> Vec<LanguageProfile> {
    let mut profiles = Vec::new();
    profiles.extend(scripting::profiles());
    profiles.extend(native::profiles());
    profiles.extend(jvm::profiles());
    profiles.extend(dotnet::profiles());
    profiles
}
