use crate::compiler::{CompilationResult, CompileOptions, CompilerBackend, LanguageStandard};
use crate::result::{CxxBuildError, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Hard cap on concurrent compiler processes.
pub const MAX_JOBS: usize = 64;

/// Worker count used when none is configured: host parallelism, clamped.
pub fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .clamp(1, MAX_JOBS)
}

/// One translation unit: a source and the object it compiles into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileUnit {
    pub index: usize,
    pub source: PathBuf,
    pub object: PathBuf,
}

/// What every unit of one build is compiled with.
#[derive(Debug, Clone)]
pub struct CompileJob {
    pub backend: Arc<CompilerBackend>,
    pub standard: LanguageStandard,
    pub options: Arc<CompileOptions>,
    pub timeout: Option<Duration>,
}

impl CompileJob {
    async fn run(&self, unit: &CompileUnit) -> Result<CompilationResult> {
        self.backend
            .compile(
                std::slice::from_ref(&unit.source),
                &unit.object,
                self.standard,
                &self.options,
                self.timeout,
            )
            .await
    }
}

#[derive(Debug)]
pub enum ScheduleOutcome {
    /// Every unit compiled; results are in unit order.
    Completed(Vec<(CompileUnit, CompilationResult)>),
    /// The first observed failure. Units that finished before it are kept
    /// for their warnings; anything still running was killed.
    Failed {
        unit: CompileUnit,
        result: CompilationResult,
        completed: Vec<(CompileUnit, CompilationResult)>,
    },
}

/** Compiles units one after another, stopping at the first failure */
pub async fn run_sequential(job: &CompileJob, units: Vec<CompileUnit>) -> Result<ScheduleOutcome> {
    let mut completed = Vec::with_capacity(units.len());

    for unit in units {
        let result = job.run(&unit).await?;
        if !result.success {
            return Ok(ScheduleOutcome::Failed {
                unit,
                result,
                completed,
            });
        }
        completed.push((unit, result));
    }

    Ok(ScheduleOutcome::Completed(completed))
}

/** Compiles units on a bounded pool of workers
 *
 * # Arguments
 * * `job` - Backend, standard and options shared by every unit
 * * `units` - Translation units to compile
 * * `jobs` - Maximum number of compiler processes alive at once
 *
 * # Notes
 * - Each worker holds a semaphore permit for the lifetime of its process
 * - On the first failed unit (or error) every other worker is aborted;
 *   aborting drops the child handle, which kills the compiler process
 * - The set is drained before returning so no task outlives the call
 */
pub async fn run_parallel(
    job: &CompileJob,
    units: Vec<CompileUnit>,
    jobs: usize,
) -> Result<ScheduleOutcome> {
    let permits = Arc::new(Semaphore::new(jobs.clamp(1, MAX_JOBS)));
    let mut workers = JoinSet::new();

    for unit in units {
        let job = job.clone();
        let permits = Arc::clone(&permits);
        workers.spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|e| CxxBuildError::process(format!("Worker pool closed: {}", e)))?;
            let result = job.run(&unit).await?;
            Ok::<_, CxxBuildError>((unit, result))
        });
    }

    let mut completed = Vec::new();
    let mut failure = None;

    while let Some(joined) = workers.join_next().await {
        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => continue,
            Err(e) => Err(CxxBuildError::process(format!("Compile worker panicked: {}", e))),
        };

        match outcome {
            Ok((unit, result)) if result.success => completed.push((unit, result)),
            Ok((unit, result)) => {
                log::debug!("Aborting remaining compiles after {} failed", unit.source.display());
                workers.abort_all();
                failure = Some((unit, result));
                break;
            }
            Err(e) => {
                workers.abort_all();
                while workers.join_next().await.is_some() {}
                return Err(e);
            }
        }
    }

    while workers.join_next().await.is_some() {}
    completed.sort_by_key(|(unit, _)| unit.index);

    Ok(match failure {
        Some((unit, result)) => ScheduleOutcome::Failed {
            unit,
            result,
            completed,
        },
        None => ScheduleOutcome::Completed(completed),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_jobs_is_clamped() {
        let jobs = default_jobs();
        assert!((1..=MAX_JOBS).contains(&jobs));
    }

    #[cfg(unix)]
    mod with_scripts {
        use super::*;
        use crate::compiler::Dialect;
        use std::os::unix::fs::PermissionsExt;
        use std::path::Path;
        use std::time::Instant;

        // Registers itself under running/ while alive and appends the number of
        // live copies to peaks; broken.cpp fails, slow_*.cpp hangs.
        const TRACKING_GXX: &str = r#"#!/bin/sh
state='@STATE@'
src=
out=
for arg in "$@"; do
  case "$arg" in *.cpp) src="$arg" ;; esac
  out="$arg"
done
case "$src" in
  */broken.cpp) echo "$src:1:1: error: broken unit" >&2; exit 1 ;;
  */slow_*) sleep 5 ;;
esac
touch "$state/running/$$"
ls "$state/running" | wc -l >> "$state/peaks"
sleep 0.2
rm -f "$state/running/$$"
: > "$out"
"#;

        fn tracking_job(dir: &Path) -> CompileJob {
            std::fs::create_dir_all(dir.join("running")).unwrap();
            let exe = dir.join("g++");
            let script = TRACKING_GXX.replace("@STATE@", &dir.to_string_lossy());
            std::fs::write(&exe, script).unwrap();
            let mut perms = std::fs::metadata(&exe).unwrap().permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&exe, perms).unwrap();

            CompileJob {
                backend: Arc::new(CompilerBackend::new("GCC", exe, Dialect::Gcc, "13.2.0")),
                standard: LanguageStandard::Cpp17,
                options: Arc::new(CompileOptions::default()),
                timeout: None,
            }
        }

        fn units(dir: &Path, names: &[&str]) -> Vec<CompileUnit> {
            names
                .iter()
                .enumerate()
                .map(|(index, name)| CompileUnit {
                    index,
                    source: dir.join(format!("{}.cpp", name)),
                    object: dir.join("obj").join(format!("{}.cpp.o", name)),
                })
                .collect()
        }

        fn peak(dir: &Path) -> usize {
            std::fs::read_to_string(dir.join("peaks"))
                .unwrap_or_default()
                .lines()
                .filter_map(|line| line.trim().parse::<usize>().ok())
                .max()
                .unwrap_or(0)
        }

        #[tokio::test]
        async fn live_compilers_never_exceed_jobs() {
            let dir = tempfile::tempdir().unwrap();
            let job = tracking_job(dir.path());
            let names = ["u0", "u1", "u2", "u3", "u4", "u5", "u6", "u7"];

            let outcome = run_parallel(&job, units(dir.path(), &names), 3).await.unwrap();

            let ScheduleOutcome::Completed(done) = outcome else {
                panic!("expected every unit to compile");
            };
            let indices: Vec<usize> = done.iter().map(|(unit, _)| unit.index).collect();
            assert_eq!(indices, (0..names.len()).collect::<Vec<_>>());
            assert!(done.iter().all(|(unit, result)| result.success && unit.object.is_file()));

            let observed = peak(dir.path());
            assert!(observed >= 1);
            assert!(observed <= 3, "saw {} compilers at once", observed);
        }

        #[tokio::test]
        async fn first_failure_kills_running_compiles() {
            let dir = tempfile::tempdir().unwrap();
            let job = tracking_job(dir.path());
            let units = units(dir.path(), &["slow_a", "broken", "slow_b"]);
            let slow_objects = [units[0].object.clone(), units[2].object.clone()];

            let started = Instant::now();
            let outcome = run_parallel(&job, units, 4).await.unwrap();
            let elapsed = started.elapsed();

            match outcome {
                ScheduleOutcome::Failed {
                    unit,
                    result,
                    completed,
                } => {
                    assert!(unit.source.ends_with("broken.cpp"));
                    assert!(result.errors[0].contains("broken unit"));
                    assert!(completed.is_empty());
                }
                ScheduleOutcome::Completed(_) => panic!("broken unit must fail the run"),
            }
            assert!(elapsed < Duration::from_secs(4), "waited {:?}", elapsed);
            assert!(slow_objects.iter().all(|object| !object.exists()));
        }

        #[tokio::test]
        async fn sequential_run_stops_at_failure() {
            let dir = tempfile::tempdir().unwrap();
            let job = tracking_job(dir.path());

            let outcome = run_sequential(&job, units(dir.path(), &["ok", "broken", "never"]))
                .await
                .unwrap();

            let ScheduleOutcome::Failed { unit, completed, .. } = outcome else {
                panic!("broken unit must fail the run");
            };
            assert_eq!(unit.index, 1);
            assert_eq!(completed.len(), 1);
            assert!(!dir.path().join("obj").join("never.cpp.o").exists());
        }
    }
}
