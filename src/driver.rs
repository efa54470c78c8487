//! The phased plugin driver: owns the three option maps, registers plugins
//! in a fixed order, and runs prepare → (cli) → execute while publishing
//! the `iago.state`/`iago.progress`/`iago.error` runtime signals.

use std::fmt;

use anyhow::Result;
use log::info;

use crate::options::{CmdlineStore, OptionStore, PropertyStore};

/// `iago.state` values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Preparing,
    Waiting,
    Executing,
    Complete,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            State::Preparing => "preparing",
            State::Waiting => "waiting",
            State::Executing => "executing",
            State::Complete => "complete",
        };
        write!(f, "{}", s)
    }
}

/// The process-wide maps every plugin phase is handed a mutable borrow of.
/// This replaces the source's three global maps with a context threaded
/// explicitly through the pipeline (see `DESIGN.md`).
pub struct Context {
    pub options: OptionStore,
    pub properties: PropertyStore,
    pub cmdline: CmdlineStore,
    pub interactive: bool,
}

impl Context {
    pub fn new(options: OptionStore, interactive: bool) -> Self {
        Context {
            options,
            properties: PropertyStore::new(),
            cmdline: CmdlineStore::new(),
            interactive,
        }
    }
}

/// A unit of work registered with the driver. Every phase is optional; a
/// plugin that has nothing to do in a phase simply keeps the default no-op.
pub trait Plugin {
    fn name(&self) -> &str;

    fn prepare(&mut self, _ctx: &mut Context) -> Result<()> {
        Ok(())
    }

    fn cli_session(&mut self, _ctx: &mut Context) -> Result<()> {
        Ok(())
    }

    fn execute(&mut self, _ctx: &mut Context) -> Result<()> {
        Ok(())
    }
}

/// Publish a runtime signal the way the boot environment's property
/// mechanism would surface it. There is no real property service to target
/// on a development host, so this crate logs the assignment at `info`,
/// the one place a future on-device build would swap in a real
/// `property_set` call.
pub fn publish(key: &str, value: &str) {
    info!("signal: {} = {}", key, value);
}

pub struct Driver {
    plugins: Vec<Box<dyn Plugin>>,
}

impl Driver {
    pub fn new() -> Self {
        Driver { plugins: Vec::new() }
    }

    /// Append a plugin. Duplicate registration is a configuration bug, not
    /// something this method guards against.
    pub fn register(&mut self, plugin: Box<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    pub fn run(&mut self, ctx: &mut Context) -> Result<()> {
        let result = self.run_inner(ctx);
        if let Err(e) = &result {
            let message = format!("{:#}", e);
            publish("iago.error", &message);
        }
        result
    }

    fn run_inner(&mut self, ctx: &mut Context) -> Result<()> {
        publish("iago.state", &State::Preparing.to_string());
        for plugin in &mut self.plugins {
            info!("[{}] prepare", plugin.name());
            plugin.prepare(ctx)?;
        }
        ctx.options.dump("prepare");

        if ctx.interactive {
            publish("iago.state", &State::Waiting.to_string());
            for plugin in &mut self.plugins {
                info!("[{}] cli_session", plugin.name());
                plugin.cli_session(ctx)?;
            }
            ctx.options.dump("cli_session");
        }

        publish("iago.state", &State::Executing.to_string());
        let count = self.plugins.len();
        for (i, plugin) in self.plugins.iter_mut().enumerate() {
            let percent = if count == 0 { 0 } else { 100 * i / count };
            publish("iago.progress", &percent.to_string());
            info!("[{}] execute", plugin.name());
            plugin.execute(ctx)?;
        }
        ctx.options.dump("execute");

        publish("iago.state", &State::Complete.to_string());
        Ok(())
    }
}

impl Default for Driver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct RecordingPlugin {
        name: &'static str,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl Plugin for RecordingPlugin {
        fn name(&self) -> &str {
            self.name
        }

        fn prepare(&mut self, _ctx: &mut Context) -> Result<()> {
            self.log.borrow_mut().push(format!("{}:prepare", self.name));
            Ok(())
        }

        fn execute(&mut self, _ctx: &mut Context) -> Result<()> {
            self.log.borrow_mut().push(format!("{}:execute", self.name));
            Ok(())
        }
    }

    #[test]
    fn phases_run_in_registration_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut driver = Driver::new();
        driver.register(Box::new(RecordingPlugin { name: "a", log: log.clone() }));
        driver.register(Box::new(RecordingPlugin { name: "b", log: log.clone() }));
        let mut ctx = Context::new(OptionStore::new(), false);
        driver.run(&mut ctx).unwrap();
        assert_eq!(
            *log.borrow(),
            vec!["a:prepare", "b:prepare", "a:execute", "b:execute"]
        );
    }

    struct FailingPlugin;

    impl Plugin for FailingPlugin {
        fn name(&self) -> &str {
            "failing"
        }

        fn execute(&mut self, _ctx: &mut Context) -> Result<()> {
            anyhow::bail!("boom")
        }
    }

    #[test]
    fn fatal_execute_aborts_the_run() {
        let mut driver = Driver::new();
        driver.register(Box::new(FailingPlugin));
        let mut ctx = Context::new(OptionStore::new(), false);
        assert!(driver.run(&mut ctx).is_err());
    }
}
