//! Rewrite pass orchestration.
//!
//! A pass runs only when the injection fingerprint is stale. It opens an
//! [`AssemblyStore`], runs every built-in step and then every discovered
//! injector (alphabetical by file name) against it, saves the dirty modules
//! to the injected directory and persists the new fingerprint.
//!
//! Injectors are matched by module name against a [`RewriteRegistry`] that is
//! filled before the pass starts.

use crate::error::{Error, Result};
use crate::fingerprint::InjectionCacheManifest;
use crate::module::ModuleImage;
use crate::store::{AssemblyStore, CandidateTable, ModuleResolver};
use camino::Utf8PathBuf;
use hangar_core::{fs, GameLayout, MODULE_EXTENSION};
use std::collections::BTreeMap;

/// A unit of module rewriting.
pub trait RewriteStep {
    fn apply(&self, resolver: &mut dyn ModuleResolver) -> Result<()>;
}

impl<F> RewriteStep for F
where
    F: Fn(&mut dyn ModuleResolver) -> Result<()>,
{
    fn apply(&self, resolver: &mut dyn ModuleResolver) -> Result<()> {
        self(resolver)
    }
}

/// Named rewrite steps known to the engine.
#[derive(Default)]
pub struct RewriteRegistry {
    builtin: Vec<(String, Box<dyn RewriteStep>)>,
    injectors: BTreeMap<String, Box<dyn RewriteStep>>,
}

impl RewriteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a step that runs on every pass, before any injector.
    pub fn register_builtin(&mut self, name: impl Into<String>, step: impl RewriteStep + 'static) {
        self.builtin.push((name.into(), Box::new(step)));
    }

    /// Binds a step to the injector module with this name.
    pub fn register_injector(&mut self, module_name: impl Into<String>, step: impl RewriteStep + 'static) {
        self.injectors.insert(module_name.into(), Box::new(step));
    }

    pub fn injector(&self, module_name: &str) -> Option<&dyn RewriteStep> {
        self.injectors.get(module_name).map(|step| step.as_ref())
    }

    pub fn builtin_names(&self) -> impl Iterator<Item = &str> {
        self.builtin.iter().map(|(name, _)| name.as_str())
    }
}

/// What a call to [`RewriteEngine::run_if_stale`] did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RewriteReport {
    /// The fingerprint was current and nothing ran.
    pub up_to_date: bool,
    pub steps_run: Vec<String>,
    /// Injector files that were not valid modules or had no registered step.
    pub skipped_injectors: Vec<Utf8PathBuf>,
    pub opened_modules: Vec<String>,
    pub saved_modules: Vec<Utf8PathBuf>,
}

pub struct RewriteEngine {
    layout: GameLayout,
    registry: RewriteRegistry,
}

impl RewriteEngine {
    pub fn new(layout: GameLayout, registry: RewriteRegistry) -> Self {
        Self { layout, registry }
    }

    /// Runs the pass unless the injection fingerprint is current.
    pub fn run_if_stale(&self) -> Result<RewriteReport> {
        let manifest = InjectionCacheManifest::load(&self.layout)?;
        if manifest.is_up_to_date() {
            return Ok(RewriteReport {
                up_to_date: true,
                ..Default::default()
            });
        }
        self.run_pass(manifest)
    }

    /// Runs the pass regardless of the fingerprint.
    pub fn run(&self) -> Result<RewriteReport> {
        let manifest = InjectionCacheManifest::load(&self.layout)?;
        self.run_pass(manifest)
    }

    fn run_pass(&self, mut manifest: InjectionCacheManifest) -> Result<RewriteReport> {
        let mut report = RewriteReport::default();
        let mut store = AssemblyStore::new(CandidateTable::from_layout(&self.layout)?);

        for (name, step) in &self.registry.builtin {
            tracing::info!("Running built-in rewrite step {}", name);
            run_step(name, step.as_ref(), &mut store)?;
            report.steps_run.push(name.clone());
        }

        tracing::info!(
            "Searching injector modules in {}:",
            self.layout.relative_to_game(&self.layout.injectors_dir)
        );
        for path in fs::list_files(&self.layout.injectors_dir, Some(MODULE_EXTENSION))? {
            tracing::info!("\t{}", path.file_name().unwrap_or(path.as_str()));
            let module = match ModuleImage::load(&path) {
                Ok(module) => module,
                Err(e) => {
                    tracing::warn!("\t\tInjector module could not be loaded: {}", e);
                    report.skipped_injectors.push(path);
                    continue;
                }
            };
            let Some(step) = self.registry.injector(&module.name) else {
                tracing::warn!("\t\tNo rewrite step registered for injector {}", module.name);
                report.skipped_injectors.push(path);
                continue;
            };
            run_step(&module.name, step, &mut store)?;
            report.steps_run.push(module.name);
        }

        report.opened_modules = store.opened().map(str::to_string).collect();
        report.saved_modules = store.save_all(&self.layout.injected_dir)?;
        store.dispose_all();
        manifest.refresh_and_save()?;
        Ok(report)
    }
}

fn run_step(name: &str, step: &dyn RewriteStep, store: &mut AssemblyStore) -> Result<()> {
    step.apply(store).map_err(|e| {
        tracing::error!("Rewrite step {} failed: {}", name, e);
        Error::Step {
            step: name.to_string(),
            source: Box::new(e),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::ModuleVersion;
    use std::cell::Cell;
    use std::rc::Rc;
    use tempfile::{tempdir, TempDir};

    fn setup() -> (TempDir, GameLayout) {
        let dir = tempdir().unwrap();
        let layout =
            GameLayout::new(Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap());
        std::fs::create_dir_all(&layout.managed_dir).unwrap();
        std::fs::create_dir_all(&layout.injectors_dir).unwrap();
        ModuleImage::new("Assembly-CSharp", ModuleVersion::new(1, 0, 0, 0))
            .save(&layout.managed_dir.join("Assembly-CSharp.dll"))
            .unwrap();
        (dir, layout)
    }

    fn write_injector(layout: &GameLayout, file: &str, name: &str) {
        ModuleImage::new(name, ModuleVersion::new(1, 0, 0, 0))
            .save(&layout.injectors_dir.join(file))
            .unwrap();
    }

    #[test]
    fn test_injectors_run_in_file_name_order() {
        let (_dir, layout) = setup();
        write_injector(&layout, "b_second.dll", "Second");
        write_injector(&layout, "a_first.dll", "First");
        std::fs::write(layout.injectors_dir.join("c_broken.dll"), b"garbage").unwrap();
        write_injector(&layout, "d_unknown.dll", "Unknown");

        let order = Rc::new(std::cell::RefCell::new(Vec::new()));
        let mut registry = RewriteRegistry::new();
        for name in ["First", "Second"] {
            let order = order.clone();
            registry.register_injector(name, move |_: &mut dyn ModuleResolver| -> Result<()> {
                order.borrow_mut().push(name);
                Ok(())
            });
        }

        let report = RewriteEngine::new(layout, registry).run_if_stale().unwrap();
        assert_eq!(*order.borrow(), vec!["First", "Second"]);
        assert_eq!(report.steps_run, vec!["First", "Second"]);
        assert_eq!(report.skipped_injectors.len(), 2);
    }

    #[test]
    fn test_step_failure_aborts_pass() {
        let (_dir, layout) = setup();
        write_injector(&layout, "a.dll", "Failing");
        write_injector(&layout, "b.dll", "After");

        let ran_after = Rc::new(Cell::new(false));
        let mut registry = RewriteRegistry::new();
        registry.register_injector("Failing", |r: &mut dyn ModuleResolver| -> Result<()> {
            r.resolve_mut("mscorlib").map(|_| ())
        });
        let flag = ran_after.clone();
        registry.register_injector("After", move |_: &mut dyn ModuleResolver| -> Result<()> {
            flag.set(true);
            Ok(())
        });

        let engine = RewriteEngine::new(layout.clone(), registry);
        let err = engine.run_if_stale().unwrap_err();
        assert!(matches!(err, Error::Step { ref step, .. } if step == "Failing"));
        assert!(!ran_after.get());
        assert!(!layout.injection_manifest_file.exists());
    }

    #[test]
    fn test_builtin_runs_first_and_saves_dirty_modules() {
        let (_dir, layout) = setup();
        write_injector(&layout, "a.dll", "Injector");

        let mut registry = RewriteRegistry::new();
        registry.register_builtin("touch", |r: &mut dyn ModuleResolver| -> Result<()> {
            r.resolve_mut("Assembly-CSharp")?.payload = b"patched".to_vec();
            Ok(())
        });
        registry.register_injector("Injector", |r: &mut dyn ModuleResolver| -> Result<()> {
            assert_eq!(r.resolve("Assembly-CSharp")?.payload, b"patched".to_vec());
            Ok(())
        });

        let report = RewriteEngine::new(layout.clone(), registry).run_if_stale().unwrap();
        assert_eq!(report.steps_run, vec!["touch", "Injector"]);
        assert_eq!(
            report.saved_modules,
            vec![layout.injected_dir.join("Assembly-CSharp.dll")]
        );
        assert!(layout.injection_manifest_file.exists());
    }
}
