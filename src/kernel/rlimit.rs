/// Resource limits applied inside the child between fork and exec
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChildRlimits {
    /// RLIMIT_AS in bytes. Runtimes that reserve large virtual ranges (JVM,
    /// V8) leave this unset and rely on their own heap flags.
    pub address_space: Option<u64>,
    /// RLIMIT_FSIZE in bytes
    pub file_size: Option<u64>,
}

impl ChildRlimits {
    /// Apply the limits to the calling process. Only async-signal-safe
    /// syscalls happen here, so it is usable from a `pre_exec` hook.
    #[cfg(unix)]
    pub fn apply(&self) -> std::io::Result<()> {
        use nix::sys::resource::{setrlimit, Resource};

        setrlimit(Resource::RLIMIT_CORE, 0, 0)?;
        if let Some(bytes) = self.file_size {
            setrlimit(Resource::RLIMIT_FSIZE, bytes, bytes)?;
        }
        if let Some(bytes) = self.address_space {
            setrlimit(Resource::RLIMIT_AS, bytes, bytes)?;
        }
        Ok(())
    }

    #[cfg(not(unix))]
    pub fn apply(&self) -> std::io::Result<()> {
        Ok(())
    }
}
