/// Environment hygiene for spawned programs
///
/// Children never inherit the host environment. They get the host `PATH`
/// (so toolchains resolve), a home and temp location inside their workspace,
/// a fixed locale, and whatever the language driver adds.
use std::collections::BTreeMap;
use std::env;
use std::path::Path;

/// Host variables copied into the child unchanged
#[cfg(unix)]
const INHERITED_VARS: &[&str] = &["PATH"];
#[cfg(windows)]
const INHERITED_VARS: &[&str] = &["PATH", "SystemRoot", "PATHEXT"];

/// Loader variables that must never reach a child, even from driver overrides
const FORBIDDEN_VARS: &[&str] = &[
    "LD_PRELOAD",
    "LD_LIBRARY_PATH",
    "LD_AUDIT",
    "DYLD_INSERT_LIBRARIES",
    "DYLD_LIBRARY_PATH",
];

/// Build the complete child environment. The map is ordered so spawns are
/// deterministic.
pub fn child_environment(workspace: &Path, extra: &[(String, String)]) -> BTreeMap<String, String> {
    let mut env_map = BTreeMap::new();

    for key in INHERITED_VARS {
        if let Some(value) = env::var_os(key) {
            env_map.insert((*key).to_string(), value.to_string_lossy().into_owned());
        }
    }

    let home = workspace.to_string_lossy().into_owned();
    env_map.insert("HOME".to_string(), home.clone());
    env_map.insert("TMPDIR".to_string(), home.clone());
    env_map.insert("TEMP".to_string(), home.clone());
    env_map.insert("TMP".to_string(), home.clone());
    if cfg!(windows) {
        env_map.insert("USERPROFILE".to_string(), home);
    }

    env_map.insert("LANG".to_string(), "C.UTF-8".to_string());
    env_map.insert("LC_ALL".to_string(), "C.UTF-8".to_string());

    for (key, value) in extra {
        if FORBIDDEN_VARS.contains(&key.as_str()) {
            log::warn!("Dropping loader variable {} from child environment", key);
            continue;
        }
        env_map.insert(key.clone(), value.clone());
    }

    env_map
}
