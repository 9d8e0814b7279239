//! Platform detection utilities.

/// Operating system families netblock knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Linux,
    MacOS,
}

impl Platform {
    /// Detect the platform of the running process.
    ///
    /// This is evaluated on every call rather than baked into the engine choice,
    /// so callers always see the platform the binary actually runs on.
    pub fn detect() -> Option<Self> {
        Self::from_os_name(std::env::consts::OS)
    }

    /// Map an OS name as reported by `std::env::consts::OS` to a platform.
    pub fn from_os_name(os: &str) -> Option<Self> {
        match os.to_ascii_lowercase().as_str() {
            "windows" => Some(Platform::Windows),
            "linux" | "android" => Some(Platform::Linux),
            "macos" | "darwin" => Some(Platform::MacOS),
            _ => None,
        }
    }

    /// Get the platform name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            Platform::Windows => "Windows",
            Platform::Linux => "Linux",
            Platform::MacOS => "macOS",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Get the current platform, if recognised.
pub fn current_platform() -> Option<Platform> {
    Platform::detect()
}

/// Get the WSL version (1 or 2+) if running in WSL.
/// Returns None if not running in WSL.
///
/// WSL1 translates syscalls instead of running a Linux kernel, so it has no
/// netfilter and iptables/ebtables cannot work there.
pub fn get_wsl_version() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        let proc_version = std::fs::read_to_string("/proc/version").ok()?;
        parse_wsl_version_from_string(&proc_version)
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

/// Parse the WSL version from a /proc/version string.
#[cfg(any(target_os = "linux", test))]
fn parse_wsl_version_from_string(proc_version: &str) -> Option<String> {
    let proc_lower = proc_version.to_lowercase();

    // Explicit marker such as "WSL2"
    if let Some(pos) = proc_lower.find("wsl") {
        if let Some(ch) = proc_lower[pos + 3..].chars().next() {
            if ch.is_ascii_digit() {
                return Some(ch.to_string());
            }
        }
    }

    // Original WSL1 kernels only say "Microsoft"
    if proc_lower.contains("microsoft") {
        return Some("1".to_string());
    }

    None
}

/// Returns true when running under WSL1.
pub fn is_wsl1() -> bool {
    get_wsl_version().as_deref() == Some("1")
}
