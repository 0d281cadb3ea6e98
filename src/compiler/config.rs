use crate::compiler::{LanguageStandard, OptimizationLevel};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Command-line grammar spoken by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Gcc,
    Clang,
    Msvc,
}

impl Dialect {
    pub fn is_gnu_compatible(&self) -> bool {
        matches!(self, Dialect::Gcc | Dialect::Clang)
    }

    pub fn object_extension(&self) -> &'static str {
        match self {
            Dialect::Msvc => "obj",
            Dialect::Gcc | Dialect::Clang => "o",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dialect::Gcc => "gcc-like",
            Dialect::Clang => "clang-like",
            Dialect::Msvc => "msvc-like",
        };
        f.write_str(name)
    }
}

/// Host operating system, used where argv syntax differs per OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOs {
    Linux,
    MacOs,
    Windows,
    Other,
}

impl HostOs {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            HostOs::Windows
        } else if cfg!(target_os = "linux") {
            HostOs::Linux
        } else if cfg!(target_os = "macos") {
            HostOs::MacOs
        } else {
            HostOs::Other
        }
    }
}

/// Numeric compiler version; `unknown` parses to `0.0.0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct CompilerVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl CompilerVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    pub fn parse(input: &str) -> Self {
        let mut parts = input
            .split('.')
            .map(|part| part.trim().parse::<u32>().unwrap_or(0));

        Self {
            major: parts.next().unwrap_or(0),
            minor: parts.next().unwrap_or(0),
            patch: parts.next().unwrap_or(0),
        }
    }

    fn at_least(&self, major: u32, minor: u32) -> bool {
        (self.major, self.minor) >= (major, minor)
    }
}

/** Capabilities of one detected compiler
 *
 * Derived from dialect plus version by [`CompilerFeatures::for_dialect`].
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompilerFeatures {
    pub supports_parallel: bool,
    pub supports_pch: bool,
    pub supports_modules: bool,
    pub supports_concepts: bool,
    pub supported_standards: BTreeSet<LanguageStandard>,
    pub supported_sanitizers: BTreeSet<String>,
    pub supported_optimizations: Vec<OptimizationLevel>,
}

impl CompilerFeatures {
    /** Builds the feature set for a dialect at a given version
     *
     * # Version Cutoffs
     * - gcc-like >= 11.0: C++23, modules, concepts
     * - clang-like >= 16.0: C++23, modules, concepts, memory/dataflow sanitizers
     * - msvc-like >= 19.29: modules; >= 19.30: concepts and C++23
     */
    pub fn for_dialect(dialect: Dialect, version: CompilerVersion) -> Self {
        use LanguageStandard::*;

        let mut features = Self {
            supports_parallel: true,
            supports_pch: true,
            supports_modules: false,
            supports_concepts: false,
            supported_standards: BTreeSet::new(),
            supported_sanitizers: BTreeSet::new(),
            supported_optimizations: Vec::new(),
        };

        match dialect {
            Dialect::Gcc | Dialect::Clang => {
                features.supported_standards =
                    [Cpp98, Cpp03, Cpp11, Cpp14, Cpp17, Cpp20].into_iter().collect();
                features.supported_sanitizers = ["address", "thread", "undefined", "leak"]
                    .into_iter()
                    .map(String::from)
                    .collect();
                features.supported_optimizations = OptimizationLevel::ALL.to_vec();

                let cutoff = if dialect == Dialect::Gcc { 11 } else { 16 };
                if version.at_least(cutoff, 0) {
                    features.supports_modules = true;
                    features.supports_concepts = true;
                    features.supported_standards.insert(Cpp23);
                    if dialect == Dialect::Clang {
                        features.supported_sanitizers.insert("memory".into());
                        features.supported_sanitizers.insert("dataflow".into());
                    }
                }
            }
            Dialect::Msvc => {
                features.supported_standards = [Cpp11, Cpp14, Cpp17, Cpp20].into_iter().collect();
                features.supported_sanitizers.insert("address".into());
                features.supported_optimizations = vec![
                    OptimizationLevel::None,
                    OptimizationLevel::Basic,
                    OptimizationLevel::Standard,
                    OptimizationLevel::Aggressive,
                ];

                if version.at_least(19, 29) {
                    features.supports_modules = true;
                }
                if version.at_least(19, 30) {
                    features.supports_concepts = true;
                    features.supported_standards.insert(Cpp23);
                }
            }
        }

        features
    }
}

/// One entry of the ordered detection probe list.
#[derive(Debug, Clone)]
pub struct CompilerSpec {
    pub name: &'static str,
    pub command_names: &'static [&'static str],
    pub dialect: Dialect,
    pub standard_flags: BTreeMap<LanguageStandard, String>,
    pub default_compile_flags: Vec<String>,
    pub default_link_flags: Vec<String>,
}

impl CompilerSpec {
    /// Probe order; the first detected entry becomes the default backend.
    pub fn known() -> Vec<CompilerSpec> {
        vec![Self::gcc(), Self::clang(), Self::msvc()]
    }

    pub fn for_dialect(dialect: Dialect) -> CompilerSpec {
        match dialect {
            Dialect::Gcc => Self::gcc(),
            Dialect::Clang => Self::clang(),
            Dialect::Msvc => Self::msvc(),
        }
    }

    fn gcc() -> Self {
        Self {
            name: "GCC",
            command_names: &["g++", "gcc"],
            dialect: Dialect::Gcc,
            standard_flags: Self::gnu_standard_flags(),
            default_compile_flags: strings(&["-Wall", "-Wextra", "-Wpedantic"]),
            default_link_flags: Vec::new(),
        }
    }

    fn clang() -> Self {
        Self {
            name: "Clang",
            command_names: &["clang++", "clang"],
            dialect: Dialect::Clang,
            standard_flags: Self::gnu_standard_flags(),
            default_compile_flags: strings(&["-Wall", "-Wextra", "-Wpedantic"]),
            default_link_flags: Vec::new(),
        }
    }

    fn msvc() -> Self {
        use LanguageStandard::*;

        Self {
            name: "MSVC",
            command_names: &["cl", "cl.exe"],
            dialect: Dialect::Msvc,
            standard_flags: [
                (Cpp14, "/std:c++14"),
                (Cpp17, "/std:c++17"),
                (Cpp20, "/std:c++20"),
                (Cpp23, "/std:c++latest"),
            ]
            .into_iter()
            .map(|(std, flag)| (std, flag.to_string()))
            .collect(),
            default_compile_flags: strings(&["/nologo", "/W4", "/EHsc"]),
            default_link_flags: Vec::new(),
        }
    }

    fn gnu_standard_flags() -> BTreeMap<LanguageStandard, String> {
        LanguageStandard::ALL
            .iter()
            .map(|std| (*std, format!("-std={}", std.as_str())))
            .collect()
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
