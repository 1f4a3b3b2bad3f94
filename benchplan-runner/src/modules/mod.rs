// Copyright (c) The benchplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test modules: named mutators that extend a test's execution plan.
//!
//! The modules listed in the `test-modules` config key are applied to every plan, in order.
//! Modules are looked up by name in a [`ModuleRegistry`], which is built once at startup and is
//! read-only afterwards.

mod codesize;
mod hash;
mod run_under;
mod timeit;

pub use codesize::CodesizeModule;
pub use hash::HashModule;
pub use run_under::RunUnderModule;
pub use timeit::TimeitModule;

use crate::{
    context::TestContext,
    errors::{PlanBuildError, StepError, UnknownModuleError},
    plan::ExecutionPlan,
};
use indexmap::IndexMap;
use tracing::debug;

/// A named mutator of execution plans.
pub trait TestModule: Send + Sync {
    /// The name used to refer to this module in configuration.
    fn name(&self) -> &'static str;

    /// A one-line description, shown by `benchplan show-modules`.
    fn description(&self) -> &'static str;

    /// Extends the plan for a test.
    ///
    /// A module may add run or result steps to the plan, edit its scripts, and read or annotate
    /// the context.
    fn mutate_plan(
        &self,
        cx: &mut TestContext<'_>,
        plan: &mut ExecutionPlan,
    ) -> Result<(), StepError>;
}

/// The set of modules known to the harness, by name.
pub struct ModuleRegistry {
    modules: IndexMap<&'static str, Box<dyn TestModule>>,
}

impl ModuleRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            modules: IndexMap::new(),
        }
    }

    /// Creates a registry containing the built-in modules.
    pub fn with_builtin_modules() -> Self {
        let mut registry = Self::new();
        registry.register(HashModule);
        registry.register(TimeitModule);
        registry.register(RunUnderModule);
        registry.register(CodesizeModule);
        registry
    }

    /// Adds a module, replacing any module with the same name.
    pub fn register(&mut self, module: impl TestModule + 'static) {
        self.modules.insert(module.name(), Box::new(module));
    }

    /// Looks up a module by name.
    pub fn get(&self, name: &str) -> Option<&dyn TestModule> {
        self.modules.get(name).map(|module| &**module)
    }

    /// Returns the names of all registered modules, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.modules.keys().copied()
    }

    /// Iterates over all registered modules, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn TestModule> + '_ {
        self.modules.values().map(|module| &**module)
    }

    /// Looks up every named module, failing on the first unknown name.
    pub fn resolve<'a>(
        &'a self,
        names: &[impl AsRef<str>],
    ) -> Result<Vec<&'a dyn TestModule>, UnknownModuleError> {
        names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                self.get(name)
                    .ok_or_else(|| UnknownModuleError::new(name, self.names()))
            })
            .collect()
    }

    /// Builds the execution plan for a test by applying the named modules in order.
    ///
    /// All names are resolved before any module runs, so an unknown name leaves the context
    /// untouched.
    pub fn build_plan(
        &self,
        cx: &mut TestContext<'_>,
        names: &[impl AsRef<str>],
    ) -> Result<ExecutionPlan, PlanBuildError> {
        let modules = self.resolve(names)?;

        let mut plan = ExecutionPlan::from_context(cx);
        for module in modules {
            debug!(
                test = cx.name(),
                module = module.name(),
                "applying test module"
            );
            module
                .mutate_plan(cx, &mut plan)
                .map_err(|err| PlanBuildError::Module {
                    module: module.name().to_owned(),
                    err,
                })?;
        }
        Ok(plan)
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::with_builtin_modules()
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::HarnessConfig,
        context::TestPaths,
        plan::RunStep,
        test_file::TestDeclaration,
    };
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};

    /// Records that it was applied, and adds a run step named after itself.
    struct Recording {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    struct Named(&'static str);

    impl RunStep for Named {
        fn name(&self) -> &str {
            self.0
        }
    }

    impl TestModule for Recording {
        fn name(&self) -> &'static str {
            self.name
        }

        fn description(&self) -> &'static str {
            "records that it was applied"
        }

        fn mutate_plan(
            &self,
            cx: &mut TestContext<'_>,
            plan: &mut ExecutionPlan,
        ) -> Result<(), StepError> {
            self.log.lock().unwrap().push(self.name);
            cx.params_mut()
                .insert(format!("applied.{}", self.name), "yes".to_owned());
            plan.add_run_step(Named(self.name));
            Ok(())
        }
    }

    struct Broken;

    impl TestModule for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn description(&self) -> &'static str {
            "always fails"
        }

        fn mutate_plan(
            &self,
            _cx: &mut TestContext<'_>,
            _plan: &mut ExecutionPlan,
        ) -> Result<(), StepError> {
            Err(StepError::custom("profiler not installed"))
        }
    }

    fn registry(log: &Arc<Mutex<Vec<&'static str>>>) -> ModuleRegistry {
        let mut registry = ModuleRegistry::new();
        for name in ["a", "b", "c"] {
            registry.register(Recording {
                name,
                log: log.clone(),
            });
        }
        registry.register(Broken);
        registry
    }

    fn with_context<T>(f: impl FnOnce(&mut TestContext<'_>) -> T) -> T {
        let config = HarnessConfig::default_config("/suite");
        let paths = TestPaths::new("/suite/bench.test", "Output");
        let declaration = TestDeclaration::parse(&paths, "RUN: ./bench\n").unwrap();
        let mut cx = TestContext::new(&config, "bench.test", paths, declaration);
        f(&mut cx)
    }

    #[test]
    fn builtin_modules() {
        let registry = ModuleRegistry::with_builtin_modules();
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            ["hash", "timeit", "run_under", "codesize"]
        );
        for module in registry.iter() {
            assert!(!module.description().is_empty());
        }
    }

    #[test]
    fn composition_is_deterministic() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = registry(&log);

        let mut step_orders = Vec::new();
        for _ in 0..2 {
            let plan = with_context(|cx| registry.build_plan(cx, &["c", "a", "b"]).unwrap());
            step_orders.push(plan.run_step_names().map(str::to_owned).collect::<Vec<_>>());
        }

        assert_eq!(*log.lock().unwrap(), ["c", "a", "b", "c", "a", "b"]);
        assert_eq!(step_orders[0], ["c", "a", "b"]);
        assert_eq!(step_orders[0], step_orders[1]);
    }

    #[test]
    fn unknown_module_aborts_before_any_module_runs() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = registry(&log);

        let error = with_context(|cx| {
            let error = registry
                .build_plan(cx, &["a", "nonexistent"])
                .expect_err("nonexistent is unknown");
            assert!(!cx.params().contains_key("applied.a"));
            error
        });

        match error {
            PlanBuildError::UnknownModule(error) => {
                assert_eq!(error.name(), "nonexistent");
                assert_eq!(
                    error.to_string(),
                    "unknown test module `nonexistent` (known modules: a, b, broken, c)"
                );
            }
            other => panic!("expected unknown module error, got {other:?}"),
        }
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn module_failure_names_the_module() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = registry(&log);

        let error = with_context(|cx| registry.build_plan(cx, &["a", "broken"]))
            .expect_err("broken always fails");
        match error {
            PlanBuildError::Module { module, err } => {
                assert_eq!(module, "broken");
                assert_eq!(err.to_string(), "profiler not installed");
            }
            other => panic!("expected module error, got {other:?}"),
        }
    }
}
