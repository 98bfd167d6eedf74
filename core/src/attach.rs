//! Attach decision engine — what happens to a workspace request.
//!
//! Maps the load flags (`detached`, `append`, `answer_yes`), the client
//! context (is this process inside an attached tmux client?), and the
//! existing-session state onto exactly one path: attach to what exists,
//! build detached, append, or build-and-attach. Build results and the
//! post-failure recovery decision are explicit values; no exception crosses
//! the builder/CLI boundary.

use std::io::Write;

use crate::build::{BuildFailure, SessionBuilder};
use crate::error::{Error, Result};
use crate::infrastructure::channel::ControlChannel;
use crate::plugin::{validate_plugins, Plugin};
use crate::types::session::SessionHandle;
use crate::types::workspace::WorkspaceSpec;


/// Caller-supplied load flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadFlags {
    pub detached: bool,
    pub append: bool,
    pub answer_yes: bool,
}


/// The interactive three-way choice when no flag decides the path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildAction {
    AttachHere,
    AppendToCurrent,
    Detached,
}

/// What to do with a partially built session after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryChoice {
    /// Kill the partial session (the default).
    Kill,
    /// Attach to it anyway for inspection.
    Attach,
    /// Leave it running unattached.
    LeaveDetached,
}


/// The terminal outcome of one load request.
#[derive(Debug)]
pub enum LoadOutcome {
    /// The target session already existed and the user attached to it.
    ExistingAttached(String),
    /// The target session already existed; no attach was performed.
    ExistingNotAttached(String),
    /// Built and left detached.
    BuiltDetached(SessionHandle),
    /// Built and attached from outside any client.
    BuiltAttached(SessionHandle),
    /// Built and switched to from inside a client.
    BuiltSwitched(SessionHandle),
    /// Windows appended into the current session.
    Appended(SessionHandle),
    /// The build failed; the chosen recovery was applied.
    BuildFailed {
        failure: BuildFailure,
        recovery: RecoveryChoice,
    },
}


/// Blocking interactive questions. Prompts block indefinitely; tests script
/// them.
pub trait Prompt {
    /// "Session already exists. Attach?"
    fn confirm_attach(&mut self, session_name: &str) -> bool;
    /// The three-way choice for a plain interactive load.
    fn build_action(&mut self) -> BuildAction;
    /// The three-way recovery choice after a failed build.
    fn recovery_choice(&mut self) -> RecoveryChoice;
    /// "Continue without the rejected plugins?"
    fn continue_without_plugins(&mut self, failures: &[Error]) -> bool;
}


/// The engine: one channel, one prompt, one client context.
pub struct AttachDecisionEngine<'a> {
    channel: &'a mut dyn ControlChannel,
    prompt: &'a mut dyn Prompt,
    inside_client: bool,
}

enum AfterBuild {
    Report,
    Attach,
}

impl<'a> AttachDecisionEngine<'a> {
    pub fn new(
        channel: &'a mut dyn ControlChannel,
        prompt: &'a mut dyn Prompt,
        inside_client: bool,
    ) -> AttachDecisionEngine<'a> {
        AttachDecisionEngine {
            channel,
            prompt,
            inside_client,
        }
    }

    /// Drive one load request end to end.
    pub fn load(
        &mut self,
        spec: &WorkspaceSpec,
        candidates: Vec<Box<dyn Plugin>>,
        flags: &LoadFlags,
    ) -> Result<LoadOutcome> {
        let _span = tracing::info_span!("load", session = %spec.session_name).entered();

        // Plugin validation happens before any side effect; the user decides
        // whether rejected plugins mean skip or abort.
        let loaded = validate_plugins(candidates);
        if !loaded.failures.is_empty()
            && !flags.answer_yes
            && !self.prompt.continue_without_plugins(&loaded.failures)
        {
            let mut failures = loaded.failures;
            return Err(failures.remove(0));
        }
        let plugins = loaded.plugins;

        // An existing target without append never builds.
        if !flags.append && self.channel.has_session(&spec.session_name)? {
            return self.offer_existing(spec, &plugins, flags);
        }

        // Append from inside a client goes into the current session.
        if flags.append && self.inside_client {
            let current = self.channel.attached_session()?.ok_or_else(|| {
                Error::validation("cannot determine the current session to append to")
            })?;
            let existing = SessionHandle::named(current);
            return self.run_build(spec, &plugins, Some(existing), true, None);
        }

        let after = if flags.detached {
            AfterBuild::Report
        } else if flags.answer_yes || flags.append {
            // append outside a client builds a normal session, then attaches
            AfterBuild::Attach
        } else {
            match self.prompt.build_action() {
                BuildAction::AttachHere => AfterBuild::Attach,
                BuildAction::Detached => AfterBuild::Report,
                BuildAction::AppendToCurrent if self.inside_client => {
                    let current = self.channel.attached_session()?.ok_or_else(|| {
                        Error::validation("cannot determine the current session to append to")
                    })?;
                    let existing = SessionHandle::named(current);
                    return self.run_build(spec, &plugins, Some(existing), true, None);
                }
                // Outside a client there is nothing to append to; fall back
                // to the append-from-outside rule.
                BuildAction::AppendToCurrent => AfterBuild::Attach,
            }
        };
        self.run_build(spec, &plugins, None, false, Some(after))
    }

    /// The target exists and append is off: offer an attach, never build.
    fn offer_existing(
        &mut self,
        spec: &WorkspaceSpec,
        plugins: &[Box<dyn Plugin>],
        flags: &LoadFlags,
    ) -> Result<LoadOutcome> {
        let name = spec.session_name.clone();
        tracing::info!(session = %name, "session already exists");
        if flags.detached {
            return Ok(LoadOutcome::ExistingNotAttached(name));
        }
        if !flags.answer_yes && !self.prompt.confirm_attach(&name) {
            return Ok(LoadOutcome::ExistingNotAttached(name));
        }
        let handle = SessionHandle::named(&name);
        for plugin in plugins {
            plugin.reattach(&handle, self.channel)?;
        }
        if self.inside_client {
            self.channel.switch_client(&name)?;
        } else {
            self.channel.attach_session(&name)?;
        }
        Ok(LoadOutcome::ExistingAttached(name))
    }

    /// Build, then apply the post-build policy (or the recovery flow).
    fn run_build(
        &mut self,
        spec: &WorkspaceSpec,
        plugins: &[Box<dyn Plugin>],
        existing: Option<SessionHandle>,
        append: bool,
        after: Option<AfterBuild>,
    ) -> Result<LoadOutcome> {
        let builder = SessionBuilder::new(self.channel, plugins);
        match builder.build(spec, existing, append) {
            Ok(session) if append => Ok(LoadOutcome::Appended(session)),
            Ok(session) => match after {
                Some(AfterBuild::Attach) => {
                    // Never stack a nested attach: inside a client, switch.
                    if self.inside_client {
                        self.channel.switch_client(&session.id)?;
                        Ok(LoadOutcome::BuiltSwitched(session))
                    } else {
                        self.channel.attach_session(&session.id)?;
                        Ok(LoadOutcome::BuiltAttached(session))
                    }
                }
                _ => Ok(LoadOutcome::BuiltDetached(session)),
            },
            Err(failure) => {
                let recovery = self.prompt.recovery_choice();
                self.apply_recovery(&failure, recovery)?;
                Ok(LoadOutcome::BuildFailed { failure, recovery })
            }
        }
    }

    fn apply_recovery(&mut self, failure: &BuildFailure, choice: RecoveryChoice) -> Result<()> {
        let Some(session) = &failure.session else {
            return Ok(());
        };
        match choice {
            RecoveryChoice::Kill => self.channel.kill_session(&session.id),
            RecoveryChoice::Attach => {
                if self.inside_client {
                    self.channel.switch_client(&session.id)
                } else {
                    self.channel.attach_session(&session.id)
                }
            }
            RecoveryChoice::LeaveDetached => Ok(()),
        }
    }
}


// ---------------------------------------------------------------------------
// Console prompt
// ---------------------------------------------------------------------------

/// Terminal prompt reading single-letter answers from stdin.
#[derive(Debug, Default)]
pub struct ConsolePrompt;

impl ConsolePrompt {
    fn ask(&self, question: &str) -> String {
        print!("{}", question);
        let _ = std::io::stdout().flush();
        let mut line = String::new();
        if std::io::stdin().read_line(&mut line).is_err() {
            return String::new();
        }
        line.trim().to_lowercase()
    }
}

impl Prompt for ConsolePrompt {
    fn confirm_attach(&mut self, session_name: &str) -> bool {
        let answer = self.ask(&format!(
            "Session '{}' already exists. Attach? [y/N] ",
            session_name
        ));
        answer.starts_with('y')
    }

    fn build_action(&mut self) -> BuildAction {
        let answer = self.ask("Load workspace: [a]ttach here, a[p]pend to current session, [d]etached? [A/p/d] ");
        match answer.as_str() {
            "p" => BuildAction::AppendToCurrent,
            "d" => BuildAction::Detached,
            _ => BuildAction::AttachHere,
        }
    }

    fn recovery_choice(&mut self) -> RecoveryChoice {
        let answer =
            self.ask("Build failed: [k]ill the partial session, [a]ttach to inspect, [l]eave it detached? [K/a/l] ");
        match answer.as_str() {
            "a" => RecoveryChoice::Attach,
            "l" => RecoveryChoice::LeaveDetached,
            _ => RecoveryChoice::Kill,
        }
    }

    fn continue_without_plugins(&mut self, failures: &[Error]) -> bool {
        for failure in failures {
            eprintln!("muxup: {}", failure);
        }
        self.ask("Continue without these plugins? [y/N] ").starts_with('y')
    }
}


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
