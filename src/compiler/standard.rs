use crate::result::{CxxBuildError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// ISO C++ language standards a backend may be asked to compile against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LanguageStandard {
    #[serde(rename = "c++98")]
    Cpp98,
    #[serde(rename = "c++03")]
    Cpp03,
    #[serde(rename = "c++11")]
    Cpp11,
    #[serde(rename = "c++14")]
    Cpp14,
    #[serde(rename = "c++17")]
    Cpp17,
    #[serde(rename = "c++20")]
    Cpp20,
    #[serde(rename = "c++23")]
    Cpp23,
    #[serde(rename = "c++26")]
    Cpp26,
}

impl LanguageStandard {
    pub const ALL: [LanguageStandard; 8] = [
        LanguageStandard::Cpp98,
        LanguageStandard::Cpp03,
        LanguageStandard::Cpp11,
        LanguageStandard::Cpp14,
        LanguageStandard::Cpp17,
        LanguageStandard::Cpp20,
        LanguageStandard::Cpp23,
        LanguageStandard::Cpp26,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LanguageStandard::Cpp98 => "c++98",
            LanguageStandard::Cpp03 => "c++03",
            LanguageStandard::Cpp11 => "c++11",
            LanguageStandard::Cpp14 => "c++14",
            LanguageStandard::Cpp17 => "c++17",
            LanguageStandard::Cpp20 => "c++20",
            LanguageStandard::Cpp23 => "c++23",
            LanguageStandard::Cpp26 => "c++26",
        }
    }

    fn from_two_digits(digits: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|std| std.as_str().ends_with(digits))
    }
}

impl Default for LanguageStandard {
    fn default() -> Self {
        LanguageStandard::Cpp17
    }
}

impl fmt::Display for LanguageStandard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/** Parses user-supplied standard names
 *
 * # Accepted Forms
 * - `c++17`, `C++17`
 * - `cpp17`
 * - `17` (two digits) or `2017` (year)
 */
impl FromStr for LanguageStandard {
    type Err = CxxBuildError;

    fn from_str(input: &str) -> Result<Self> {
        let normalized = input.trim().to_ascii_lowercase();

        let digits = if let Some(rest) = normalized.strip_prefix("c++") {
            rest
        } else if let Some(rest) = normalized.strip_prefix("cpp") {
            rest
        } else {
            normalized.as_str()
        };

        let resolved = match digits.len() {
            2 if digits.chars().all(|c| c.is_ascii_digit()) => Self::from_two_digits(digits),
            4 if digits.chars().all(|c| c.is_ascii_digit()) => {
                Self::from_two_digits(&digits[2..])
            }
            _ => None,
        };

        resolved.ok_or_else(|| {
            let valid: Vec<&str> = Self::ALL.iter().map(|s| s.as_str()).collect();
            CxxBuildError::config(format!(
                "Invalid C++ version: {}. Valid versions: {}",
                input,
                valid.join(", ")
            ))
        })
    }
}

/// Dialect-neutral optimization levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptimizationLevel {
    #[serde(rename = "O0")]
    None,
    #[serde(rename = "O1")]
    Basic,
    #[serde(rename = "O2")]
    Standard,
    #[serde(rename = "O3")]
    Aggressive,
    #[serde(rename = "Os")]
    Size,
    #[serde(rename = "Ofast")]
    Fast,
    #[serde(rename = "Og")]
    Debug,
}

impl OptimizationLevel {
    pub const ALL: [OptimizationLevel; 7] = [
        OptimizationLevel::None,
        OptimizationLevel::Basic,
        OptimizationLevel::Standard,
        OptimizationLevel::Aggressive,
        OptimizationLevel::Size,
        OptimizationLevel::Fast,
        OptimizationLevel::Debug,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OptimizationLevel::None => "O0",
            OptimizationLevel::Basic => "O1",
            OptimizationLevel::Standard => "O2",
            OptimizationLevel::Aggressive => "O3",
            OptimizationLevel::Size => "Os",
            OptimizationLevel::Fast => "Ofast",
            OptimizationLevel::Debug => "Og",
        }
    }
}

impl Default for OptimizationLevel {
    fn default() -> Self {
        OptimizationLevel::Standard
    }
}

impl fmt::Display for OptimizationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptimizationLevel {
    type Err = CxxBuildError;

    fn from_str(input: &str) -> Result<Self> {
        let trimmed = input.trim().trim_start_matches('-');
        let canonical = match trimmed {
            "0" | "1" | "2" | "3" | "s" | "fast" | "g" => format!("O{}", trimmed),
            other => other.to_string(),
        };

        Self::ALL
            .iter()
            .copied()
            .find(|level| level.as_str() == canonical)
            .ok_or_else(|| {
                CxxBuildError::config(format!("Invalid optimization level: {}", input))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_accepts_common_spellings() {
        for input in ["c++17", "C++17", "cpp17", "17", "2017", " c++17 "] {
            assert_eq!(
                input.parse::<LanguageStandard>().unwrap(),
                LanguageStandard::Cpp17,
                "input {input:?}"
            );
        }
        assert_eq!("1998".parse::<LanguageStandard>().unwrap(), LanguageStandard::Cpp98);
        assert_eq!("c++03".parse::<LanguageStandard>().unwrap(), LanguageStandard::Cpp03);
    }

    #[test]
    fn standard_rejects_unknown() {
        let err = "c++19".parse::<LanguageStandard>().unwrap_err();
        assert!(err.to_string().contains("Valid versions"));
        assert!("gnu++17".parse::<LanguageStandard>().is_err());
    }

    #[test]
    fn optimization_parsing() {
        assert_eq!("O3".parse::<OptimizationLevel>().unwrap(), OptimizationLevel::Aggressive);
        assert_eq!("-Os".parse::<OptimizationLevel>().unwrap(), OptimizationLevel::Size);
        assert_eq!("0".parse::<OptimizationLevel>().unwrap(), OptimizationLevel::None);
        assert_eq!("fast".parse::<OptimizationLevel>().unwrap(), OptimizationLevel::Fast);
        assert!("O9".parse::<OptimizationLevel>().is_err());
    }

    #[test]
    fn serde_uses_flag_spelling() {
        let json = serde_json::to_string(&LanguageStandard::Cpp20).unwrap();
        assert_eq!(json, "\"c++20\"");
        let level: OptimizationLevel = serde_json::from_str("\"Og\"").unwrap();
        assert_eq!(level, OptimizationLevel::Debug);
    }
}
