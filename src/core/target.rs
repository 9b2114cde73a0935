// This module holds the target side of a translation: CompilationTarget is the
// self-contained bundle of codegen settings that is copied into every worker (triple
// override, CPU, feature attributes, PIC/PIE, debug info, optimisation toggles and raw
// backend options). Triple is a forgiving parser for `<arch>-<vendor>-<os>[-<env>]`
// strings that only classifies what the default-CPU and position-independence policies
// need: architecture family, Apple-ness, Windows-ness and a handful of OS/environment
// names. default_cpu implements the triple → CPU table used when no CPU is given, and
// position_policy decides whether a PIC/PIE request is applied or skipped with a warning.
// CompilationTarget::to_args serialises the target back into command-line flags so a
// re-executed worker process parses exactly the same settings as the coordinator.

//! Codegen target settings and triple-derived defaults.

/// Codegen settings shared by every job of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompilationTarget {
    /// Triple override; empty means use the module's embedded triple.
    pub triple: String,
    /// Empty means derive from the effective triple.
    pub cpu: String,
    /// Feature string passed through verbatim (`+sse4.2,-avx`).
    pub attrs: String,
    pub pic: bool,
    pub pie: bool,
    pub debug_info: bool,
    pub opt: OptimizationSettings,
    /// Raw backend options (`--llvm a,b`).
    pub backend_options: Vec<String>,
}

/// Optimisation controls forwarded to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimizationSettings {
    pub level: u8,
    pub disable_all: bool,
    pub disable_inline: bool,
    pub disable_gvn: bool,
    pub disable_vectorization: bool,
}

impl Default for OptimizationSettings {
    fn default() -> Self {
        Self {
            level: 2,
            disable_all: false,
            disable_inline: false,
            disable_gvn: false,
            disable_vectorization: false,
        }
    }
}

impl CompilationTarget {
    /// Triple to compile for, given the module's embedded triple.
    pub fn effective_triple(&self, embedded: &str) -> String {
        if self.triple.is_empty() {
            embedded.to_string()
        } else {
            self.triple.clone()
        }
    }

    /// CPU to compile for on `triple`.
    pub fn effective_cpu(&self, triple: &Triple) -> String {
        if self.cpu.is_empty() {
            default_cpu(triple).to_string()
        } else {
            self.cpu.clone()
        }
    }

    /// Command-line flags that reproduce this target in a worker process.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if !self.triple.is_empty() {
            args.push(format!("--target={}", self.triple));
        }
        if !self.cpu.is_empty() {
            args.push(format!("--cpu={}", self.cpu));
        }
        if !self.attrs.is_empty() {
            args.push(format!("--attrs={}", self.attrs));
        }
        if self.pic {
            args.push("--pic".to_string());
        }
        if self.pie {
            args.push("--pie".to_string());
        }
        if self.debug_info {
            args.push("--generate-debug-symbols".to_string());
        }
        if self.opt.disable_all {
            args.push("--disable-optimizations".to_string());
        }
        if self.opt.disable_inline {
            args.push("--disable-inline-pass".to_string());
        }
        if self.opt.disable_gvn {
            args.push("--disable-gvn-pass".to_string());
        }
        if self.opt.disable_vectorization {
            args.push("--disable-vectorization-pass".to_string());
        }
        args.push(format!("-O{}", self.opt.level));
        if !self.backend_options.is_empty() {
            args.push(format!("--llvm={}", self.backend_options.join(",")));
        }
        args
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    X86_64,
    X86,
    Arm64,
    Other,
}

/// The parts of a target triple the default policies care about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Triple {
    arch: Arch,
    vendor: String,
    os: String,
    env: String,
}

const KNOWN_OS: &[&str] = &[
    "darwin", "macos", "ios", "tvos", "watchos", "xros", "driverkit", "linux", "windows",
    "win32", "mingw32", "cygwin", "freebsd", "netbsd", "openbsd", "dragonfly", "haiku",
    "bitrig", "solaris", "android", "fuchsia", "wasi", "emscripten",
];

impl Triple {
    pub fn parse(triple: &str) -> Self {
        let parts: Vec<&str> = triple.split('-').collect();
        let arch = match parts.first().copied().unwrap_or_default() {
            "x86_64" | "amd64" | "x86_64h" => Arch::X86_64,
            "i386" | "i486" | "i586" | "i686" | "i786" | "i886" | "i986" | "x86" => Arch::X86,
            "aarch64" | "arm64" | "arm64e" => Arch::Arm64,
            _ => Arch::Other,
        };

        // Vendors are optional in hand-written triples (`x86_64-linux-gnu`).
        let rest = parts.get(1..).unwrap_or_default();
        let skip = usize::from(rest.len() >= 3);
        let os_idx = rest
            .iter()
            .skip(skip)
            .position(|part| KNOWN_OS.iter().any(|os| part.starts_with(os)))
            .map(|idx| idx + skip);
        let (vendor, os, env) = match os_idx {
            Some(idx) => (
                rest[..idx].join("-"),
                rest[idx].to_string(),
                rest.get(idx + 1..).unwrap_or_default().join("-"),
            ),
            None => (
                rest.first().copied().unwrap_or_default().to_string(),
                rest.get(1).copied().unwrap_or_default().to_string(),
                rest.get(2..).unwrap_or_default().join("-"),
            ),
        };

        Self {
            arch,
            vendor,
            os,
            env,
        }
    }

    pub fn arch(&self) -> Arch {
        self.arch
    }

    pub fn is_apple(&self) -> bool {
        const APPLE_OS: &[&str] = &["darwin", "macos", "ios", "tvos", "watchos", "xros", "driverkit"];
        APPLE_OS.iter().any(|os| self.os.starts_with(os))
            || (self.vendor == "apple" && self.os.is_empty())
    }

    pub fn is_windows(&self) -> bool {
        ["windows", "win32", "mingw32", "cygwin"]
            .iter()
            .any(|os| self.os.starts_with(os))
    }

    pub fn is_android(&self) -> bool {
        self.env.starts_with("android") || self.os.starts_with("android")
    }

    fn os_is(&self, name: &str) -> bool {
        self.os.starts_with(name)
    }
}

/// CPU picked for `triple` when the caller names none.
///
/// An empty result lets the backend choose.
pub fn default_cpu(triple: &Triple) -> &'static str {
    if triple.is_apple() {
        return match triple.arch() {
            Arch::X86_64 => "core2",
            Arch::X86 => "yonah",
            Arch::Arm64 => "cyclone",
            Arch::Other => "",
        };
    }

    match triple.arch() {
        Arch::X86_64 => "x86-64",
        Arch::X86 => {
            if triple.is_android() {
                "i686"
            } else if ["freebsd", "netbsd", "openbsd"].iter().any(|os| triple.os_is(os)) {
                "i486"
            } else if triple.os_is("haiku") {
                "i586"
            } else if triple.os_is("bitrig") {
                "i686"
            } else {
                "pentium4"
            }
        }
        Arch::Arm64 | Arch::Other => "",
    }
}

/// Position-independence model handed to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PicModel {
    /// `--pic`
    Dynamic,
    /// `--pie`
    Static,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionPolicy {
    /// Nothing requested.
    Unset,
    /// Requested, but the target OS has no use for it.
    Ignored,
    Apply(PicModel),
}

/// Decide how a PIC/PIE request applies to `triple`.
pub fn position_policy(target: &CompilationTarget, triple: &Triple) -> PositionPolicy {
    if !target.pic && !target.pie {
        return PositionPolicy::Unset;
    }
    if triple.is_windows() {
        return PositionPolicy::Ignored;
    }
    if target.pie {
        PositionPolicy::Apply(PicModel::Static)
    } else {
        PositionPolicy::Apply(PicModel::Dynamic)
    }
}
