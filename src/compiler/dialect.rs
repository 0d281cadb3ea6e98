use crate::compiler::{CompileOptions, CompilerFeatures, Dialect, HostOs, LinkOptions, OptimizationLevel};
use std::path::{Path, PathBuf};

/// Everything a translator needs to render one compile invocation.
pub struct CompileInvocation<'a> {
    pub standard_flag: &'a str,
    pub sources: &'a [PathBuf],
    pub output: &'a Path,
    pub options: &'a CompileOptions,
    pub features: &'a CompilerFeatures,
    pub default_flags: &'a [String],
}

/// Everything a translator needs to render one link invocation.
pub struct LinkInvocation<'a> {
    pub objects: &'a [PathBuf],
    pub output: &'a Path,
    pub options: &'a LinkOptions,
    pub default_flags: &'a [String],
    pub host: HostOs,
}

/** Maps dialect-neutral options onto one compiler's argv grammar
 *
 * Implementations return the arguments only; the backend prepends the
 * executable path. Argument order is part of the contract: standard flag,
 * includes, defines, warnings, optimization, debug, pic, sanitizers,
 * stdlib, default flags, extra flags, compile-only switch, sources, output.
 */
pub trait ArgumentTranslator: Send + Sync {
    fn compile_args(&self, invocation: &CompileInvocation<'_>) -> Vec<String>;
    fn link_args(&self, invocation: &LinkInvocation<'_>) -> Vec<String>;
}

/// Selects the translation strategy for a dialect.
pub fn translator_for(dialect: Dialect) -> &'static dyn ArgumentTranslator {
    static GNU: GnuTranslator = GnuTranslator;
    static MSVC: MsvcTranslator = MsvcTranslator;

    match dialect {
        Dialect::Gcc | Dialect::Clang => &GNU,
        Dialect::Msvc => &MSVC,
    }
}

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn define_arg(prefix: &str, name: &str, value: &Option<String>) -> String {
    match value {
        Some(value) => format!("{}{}={}", prefix, name, value),
        None => format!("{}{}", prefix, name),
    }
}

/** Resolves `requested` to a level the compiler advertises
 *
 * Unsupported levels step down towards `O0`: `Ofast` and `O3` to `O2`,
 * `Os` to `O1` (size-favoring), `Og` to `O0`. A warning names the
 * substitution.
 */
fn supported_optimization(features: &CompilerFeatures, requested: OptimizationLevel) -> OptimizationLevel {
    let mut level = requested;
    while !features.supported_optimizations.contains(&level) && level != OptimizationLevel::None {
        level = match level {
            OptimizationLevel::Fast | OptimizationLevel::Aggressive => OptimizationLevel::Standard,
            OptimizationLevel::Size | OptimizationLevel::Standard => OptimizationLevel::Basic,
            OptimizationLevel::Basic | OptimizationLevel::Debug | OptimizationLevel::None => {
                OptimizationLevel::None
            }
        };
    }

    if level != requested {
        log::warn!(
            "Optimization level '{}' is not supported; using '{}'",
            requested,
            level
        );
    }
    level
}

/// gcc-like and clang-like command lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct GnuTranslator;

impl GnuTranslator {
    fn optimization_flag(level: OptimizationLevel) -> &'static str {
        match level {
            OptimizationLevel::None => "-O0",
            OptimizationLevel::Basic => "-O1",
            OptimizationLevel::Standard => "-O2",
            OptimizationLevel::Aggressive => "-O3",
            OptimizationLevel::Size => "-Os",
            OptimizationLevel::Fast => "-Ofast",
            OptimizationLevel::Debug => "-Og",
        }
    }

    fn rpath_arg(host: HostOs, path: &Path) -> String {
        match host {
            HostOs::MacOs => format!("-Wl,-rpath,{}", path.display()),
            _ => format!("-Wl,-rpath={}", path.display()),
        }
    }
}

impl ArgumentTranslator for GnuTranslator {
    fn compile_args(&self, inv: &CompileInvocation<'_>) -> Vec<String> {
        let options = inv.options;
        let mut args = vec![inv.standard_flag.to_string()];

        args.extend(options.include_paths.iter().map(|p| format!("-I{}", p.display())));
        args.extend(
            options
                .defines
                .iter()
                .map(|(name, value)| define_arg("-D", name, value)),
        );
        args.extend(options.warnings.iter().cloned());
        let optimization = supported_optimization(inv.features, options.optimization);
        args.push(Self::optimization_flag(optimization).to_string());

        if options.debug {
            args.push("-g".into());
        }
        if options.position_independent {
            args.push("-fPIC".into());
        }

        for sanitizer in &options.sanitizers {
            if inv.features.supported_sanitizers.contains(sanitizer) {
                args.push(format!("-fsanitize={}", sanitizer));
            } else {
                log::warn!("Skipping unsupported sanitizer '{}'", sanitizer);
            }
        }

        if let Some(stdlib) = &options.standard_library {
            args.push(format!("-stdlib={}", stdlib));
        }

        args.extend(inv.default_flags.iter().cloned());
        args.extend(options.extra_flags.iter().cloned());
        args.push("-c".into());
        args.extend(inv.sources.iter().map(|s| display(s)));
        args.push("-o".into());
        args.push(display(inv.output));
        args
    }

    fn link_args(&self, inv: &LinkInvocation<'_>) -> Vec<String> {
        let options = inv.options;
        let mut args = Vec::new();

        if options.shared {
            args.push("-shared".to_string());
        }
        if options.static_link {
            args.push("-static".to_string());
        }

        args.extend(options.library_paths.iter().map(|p| format!("-L{}", p.display())));
        args.extend(
            options
                .runtime_library_paths
                .iter()
                .map(|p| Self::rpath_arg(inv.host, p)),
        );
        args.extend(options.libraries.iter().map(|lib| format!("-l{}", lib)));

        if options.strip_symbols {
            args.push("-s".into());
        }
        if let Some(map) = &options.map_file {
            args.push(format!("-Wl,-Map={}", map.display()));
        }

        args.extend(inv.default_flags.iter().cloned());
        args.extend(options.extra_flags.iter().cloned());
        args.extend(inv.objects.iter().map(|o| display(o)));
        args.push("-o".into());
        args.push(display(inv.output));
        args
    }
}

/// msvc-like (`cl.exe`) command lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct MsvcTranslator;

impl MsvcTranslator {
    fn optimization_flag(level: OptimizationLevel) -> &'static str {
        match level {
            OptimizationLevel::None | OptimizationLevel::Debug => "/Od",
            OptimizationLevel::Basic => "/O1",
            OptimizationLevel::Standard | OptimizationLevel::Fast => "/O2",
            OptimizationLevel::Aggressive => "/Ox",
            OptimizationLevel::Size => "/Os",
        }
    }
}

impl ArgumentTranslator for MsvcTranslator {
    fn compile_args(&self, inv: &CompileInvocation<'_>) -> Vec<String> {
        let options = inv.options;
        let mut args = vec![inv.standard_flag.to_string()];

        args.extend(options.include_paths.iter().map(|p| format!("/I{}", p.display())));
        args.extend(
            options
                .defines
                .iter()
                .map(|(name, value)| define_arg("/D", name, value)),
        );
        args.extend(options.warnings.iter().cloned());
        let optimization = supported_optimization(inv.features, options.optimization);
        args.push(Self::optimization_flag(optimization).to_string());

        if options.debug {
            args.push("/Zi".into());
        }

        // cl.exe has no -fPIC or -stdlib equivalent and only an address sanitizer.
        for sanitizer in &options.sanitizers {
            if sanitizer == "address" && inv.features.supported_sanitizers.contains(sanitizer) {
                args.push("/fsanitize=address".into());
            } else {
                log::warn!("Skipping unsupported sanitizer '{}' for msvc", sanitizer);
            }
        }

        args.extend(inv.default_flags.iter().cloned());
        args.extend(options.extra_flags.iter().cloned());
        args.push("/c".into());
        args.extend(inv.sources.iter().map(|s| display(s)));
        args.push(format!("/Fo{}", inv.output.display()));
        args
    }

    fn link_args(&self, inv: &LinkInvocation<'_>) -> Vec<String> {
        let options = inv.options;
        let mut args: Vec<String> = vec!["/nologo".into()];
        args.extend(inv.objects.iter().map(|o| display(o)));

        args.push("/link".into());
        if options.shared {
            args.push("/DLL".into());
        }
        args.extend(
            options
                .library_paths
                .iter()
                .map(|p| format!("/LIBPATH:{}", p.display())),
        );
        args.extend(options.libraries.iter().map(|lib| format!("{}.lib", lib)));

        if let Some(map) = &options.map_file {
            args.push(format!("/MAP:{}", map.display()));
        }

        args.extend(inv.default_flags.iter().cloned());
        args.extend(options.extra_flags.iter().cloned());
        args.push(format!("/OUT:{}", inv.output.display()));
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::CompilerVersion;
    use std::collections::BTreeMap;

    fn sample_options() -> CompileOptions {
        let mut defines = BTreeMap::new();
        defines.insert("DEBUG".to_string(), None);
        defines.insert("V".to_string(), Some("2".to_string()));
        CompileOptions {
            include_paths: vec![PathBuf::from("inc")],
            defines,
            debug: true,
            ..Default::default()
        }
    }

    fn compile_for(dialect: Dialect, options: &CompileOptions) -> Vec<String> {
        let features = CompilerFeatures::for_dialect(dialect, CompilerVersion::new(20, 0, 0));
        let sources = vec![PathBuf::from("main.cpp")];
        let invocation = CompileInvocation {
            standard_flag: if dialect == Dialect::Msvc { "/std:c++17" } else { "-std=c++17" },
            sources: &sources,
            output: Path::new("main.o"),
            options,
            features: &features,
            default_flags: &[],
        };
        translator_for(dialect).compile_args(&invocation)
    }

    /// Keeps only the arguments produced by includes, defines and debug.
    fn interesting(args: &[String]) -> Vec<&str> {
        args.iter()
            .map(String::as_str)
            .filter(|a| {
                a.starts_with("-I") || a.starts_with("-D") || *a == "-g"
                    || a.starts_with("/I") || a.starts_with("/D") || *a == "/Zi"
            })
            .collect()
    }

    #[test]
    fn gnu_translation_of_shared_vocabulary() {
        let args = compile_for(Dialect::Gcc, &sample_options());
        assert_eq!(interesting(&args), vec!["-Iinc", "-DDEBUG", "-DV=2", "-g"]);
        assert_eq!(args[0], "-std=c++17");
        assert!(args.contains(&"-O2".to_string()));
        assert_eq!(&args[args.len() - 4..], &["-c", "main.cpp", "-o", "main.o"]);
    }

    #[test]
    fn msvc_translation_of_shared_vocabulary() {
        let args = compile_for(Dialect::Msvc, &sample_options());
        assert_eq!(interesting(&args), vec!["/Iinc", "/DDEBUG", "/DV=2", "/Zi"]);
        assert!(args.contains(&"/O2".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("/Fomain.o"));
    }

    #[test]
    fn unsupported_sanitizers_and_gnu_only_flags() {
        let options = CompileOptions {
            position_independent: true,
            sanitizers: vec!["address".into(), "memory".into()],
            standard_library: Some("libc++".into()),
            ..Default::default()
        };

        let gcc = compile_for(Dialect::Gcc, &options);
        assert!(gcc.contains(&"-fPIC".to_string()));
        assert!(gcc.contains(&"-fsanitize=address".to_string()));
        assert!(!gcc.contains(&"-fsanitize=memory".to_string()));
        assert!(gcc.contains(&"-stdlib=libc++".to_string()));

        let msvc = compile_for(Dialect::Msvc, &options);
        assert!(msvc.contains(&"/fsanitize=address".to_string()));
        assert!(!msvc.iter().any(|a| a.contains("PIC") || a.contains("stdlib")));
    }

    fn link_for(dialect: Dialect, host: HostOs, options: &LinkOptions) -> Vec<String> {
        let objects = vec![PathBuf::from("a.o"), PathBuf::from("b.o")];
        let invocation = LinkInvocation {
            objects: &objects,
            output: Path::new("app"),
            options,
            default_flags: &[],
            host,
        };
        translator_for(dialect).link_args(&invocation)
    }

    #[test]
    fn rpath_syntax_follows_host_os() {
        let options = LinkOptions {
            runtime_library_paths: vec![PathBuf::from("/opt/lib")],
            ..Default::default()
        };
        let linux = link_for(Dialect::Clang, HostOs::Linux, &options);
        assert!(linux.contains(&"-Wl,-rpath=/opt/lib".to_string()));

        let mac = link_for(Dialect::Clang, HostOs::MacOs, &options);
        assert!(mac.contains(&"-Wl,-rpath,/opt/lib".to_string()));

        let msvc = link_for(Dialect::Msvc, HostOs::Windows, &options);
        assert!(!msvc.iter().any(|a| a.contains("rpath")));
    }

    #[test]
    fn link_libraries_per_dialect() {
        let options = LinkOptions {
            library_paths: vec![PathBuf::from("lib")],
            libraries: vec!["m".into(), "z".into()],
            shared: true,
            strip_symbols: true,
            map_file: Some(PathBuf::from("app.map")),
            ..Default::default()
        };

        let gnu = link_for(Dialect::Gcc, HostOs::Linux, &options);
        for expected in ["-shared", "-Llib", "-lm", "-lz", "-s", "-Wl,-Map=app.map"] {
            assert!(gnu.contains(&expected.to_string()), "missing {expected}");
        }
        assert_eq!(&gnu[gnu.len() - 4..], &["a.o", "b.o", "-o", "app"]);

        let msvc = link_for(Dialect::Msvc, HostOs::Windows, &options);
        let link_pos = msvc.iter().position(|a| a == "/link").unwrap();
        assert!(msvc[..link_pos].contains(&"a.o".to_string()));
        for expected in ["/DLL", "/LIBPATH:lib", "m.lib", "z.lib", "/MAP:app.map", "/OUT:app"] {
            let pos = msvc.iter().position(|a| a == expected);
            assert!(matches!(pos, Some(p) if p > link_pos), "missing {expected}");
        }
        assert!(!msvc.contains(&"-s".to_string()));
    }

    #[test]
    fn msvc_optimizations_fall_back_to_supported_levels() {
        let flag_for = |level| {
            let options = CompileOptions {
                optimization: level,
                ..Default::default()
            };
            let args = compile_for(Dialect::Msvc, &options);
            args.into_iter().find(|a| a.starts_with("/O")).unwrap()
        };

        assert_eq!(flag_for(OptimizationLevel::Aggressive), "/Ox");
        assert_eq!(flag_for(OptimizationLevel::Size), "/O1");
        assert_eq!(flag_for(OptimizationLevel::Fast), "/O2");
        assert_eq!(flag_for(OptimizationLevel::Debug), "/Od");

        let gcc = compile_for(
            Dialect::Gcc,
            &CompileOptions {
                optimization: OptimizationLevel::Size,
                ..Default::default()
            },
        );
        assert!(gcc.contains(&"-Os".to_string()));
    }

    #[test]
    fn standard_flag_leads() {
        let options = CompileOptions::default();
        let args = compile_for(Dialect::Clang, &options);
        assert_eq!(args.first().map(String::as_str), Some("-std=c++17"));
    }
}
