//! Scenario session engine: link state machine, command handlers, progress.
//!
//! The engine never sleeps. Delayed work goes into its [`Schedule`], and the
//! host loop calls [`Engine::advance`] with the current instant to fire
//! whatever has come due. Every call takes the sink to write to.

pub mod commands;
pub mod decode;
pub mod hints;
pub mod output;
pub mod progress;
pub mod schedule;
pub mod session;

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Timings;
use crate::scenario::{FileEntry, Node, Scenario, ScenarioSource, GLOBAL_HINTS};
use commands::{Action, Parsed};
use decode::Codec;
use output::{Sink, Tone};
use progress::Submission;
use schedule::{Due, Schedule, Stage, Task};
use session::{fmt_clock, Link, Session};

pub const BOOT_BANNER: &str = "ECHO-INTELNET v1.2 · Training build";
const RULE: &str = "────────────────────────────────────────────────";
const DEFAULT_COMPLETE: &str = "MISSION COMPLETE ✅";
const INTRUSION_REASON: &str = "Intrusion detected. Link dropped.";

pub struct Engine {
    scenario: Scenario,
    routes: HashMap<String, String>,
    session: Session,
    schedule: Schedule,
    timings: Timings,
    source: Box<dyn ScenarioSource>,
}

impl Engine {
    pub fn new(timings: Timings, source: Box<dyn ScenarioSource>) -> Self {
        Engine {
            scenario: Scenario::default(),
            routes: HashMap::new(),
            session: Session::default(),
            schedule: Schedule::new(),
            timings,
            source,
        }
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn source(&self) -> &dyn ScenarioSource {
        self.source.as_ref()
    }

    /// When the next timer is due, so the host loop knows how long to wait.
    pub fn next_due(&self) -> Option<Instant> {
        self.schedule.next_due()
    }

    pub fn boot(&self, sink: &mut dyn Sink) {
        sink.write(BOOT_BANNER, Tone::Muted);
        sink.write(
            "No scenario loaded. Use run <file> to load a scenario from /scenarios",
            Tone::Muted,
        );
        sink.write(RULE, Tone::Muted);
    }

    /// Replace the scenario wholesale and start a fresh session.
    pub fn load_scenario(&mut self, scenario: Scenario, sink: &mut dyn Sink) {
        self.clear_session(sink);
        self.routes = scenario.ip_routes();
        self.scenario = scenario;
        info!(
            id = %self.scenario.id,
            codes = self.scenario.codes.len(),
            nodes = self.scenario.nodes.len(),
            "scenario loaded"
        );
        sink.write(
            &format!("Loaded scenario: {}", self.scenario.heading()),
            Tone::Success,
        );
        if !self.scenario.objective.is_empty() {
            sink.write(&self.scenario.objective, Tone::Out);
        }
    }

    /// Parse and run one console line.
    pub fn handle_line(&mut self, line: &str, now: Instant, sink: &mut dyn Sink) {
        let (command, args) = match commands::parse(line) {
            Parsed::Empty => return,
            Parsed::Unknown(name) => {
                sink.write(&format!("Unknown command: {} (try 'help')", name), Tone::Err);
                return;
            }
            Parsed::Invoke { command, args } => (command, args),
        };
        if args.len() < command.min_args {
            sink.write(&format!("Usage: {}", command.usage), Tone::Warn);
            return;
        }
        debug!(command = command.name, ?args, "dispatch");

        let arg = |i: usize| args.get(i).map(String::as_str).unwrap_or_default();
        match command.action {
            Action::Help => self.help(sink),
            Action::Clear => sink.clear(),
            Action::Scan => self.scan(now, sink),
            Action::Connect => self.connect(arg(0), now, sink),
            Action::Disconnect => self.disconnect(sink),
            Action::Ls => self.ls(sink),
            Action::Cat => self.cat(arg(0), sink),
            Action::Decode => self.decode(arg(0), arg(1), sink),
            Action::Status => self.status(now, sink),
            Action::Submit => self.submit(arg(0), sink),
            Action::Hint => self.hint(sink),
            Action::Reset => self.reset(sink),
            Action::Run => self.run(args.first().map(String::as_str), sink),
        }
    }

    /// Fire every timer due at or before `now`, in due order.
    pub fn advance(&mut self, now: Instant, sink: &mut dyn Sink) {
        while let Some(due) = self.schedule.pop_due(now) {
            self.fire(due, sink);
        }
    }

    pub fn help(&self, sink: &mut dyn Sink) {
        sink.write("Available commands:", Tone::Muted);
        for line in commands::help_lines() {
            sink.write(&line, Tone::Out);
        }
    }

    pub fn scan(&mut self, now: Instant, sink: &mut dyn Sink) {
        sink.write("Running passive scan…", Tone::Muted);
        self.schedule.push(
            now + self.timings.scan_delay(),
            self.session.session_ticket(),
            Task::ScanReport,
        );
    }

    pub fn connect(&mut self, target: &str, now: Instant, sink: &mut dyn Sink) {
        if !self.session.is_idle() {
            sink.write(
                "A session is already active. Use `disconnect` first.",
                Tone::Warn,
            );
            return;
        }

        let host = if self.scenario.nodes.contains_key(target) {
            target.to_string()
        } else if is_ipv4_literal(target) {
            match self.routes.get(target) {
                Some(host) => host.clone(),
                None => {
                    sink.write(&format!("Attempting connection to {} …", target), Tone::Muted);
                    self.schedule.push(
                        now + self.timings.probe_timeout(),
                        self.session.session_ticket(),
                        Task::ProbeTimeout,
                    );
                    return;
                }
            }
        } else {
            sink.write(
                "Unknown target. Use a valid field address or visible host name.",
                Tone::Warn,
            );
            return;
        };

        let display = if self.routes.contains_key(target) {
            match self.scenario.nodes.get(&host) {
                Some(node) if node.visible => format!("{} ({})", target, host),
                _ => target.to_string(),
            }
        } else {
            host.clone()
        };
        sink.write(&format!("Connecting to {} …", display), Tone::Muted);

        self.session.begin_link(&host);
        info!(%host, "link requested");
        self.schedule.push(
            now + self.timings.connect_delay(),
            self.session.link_ticket(),
            Task::Stage(Stage::Probing),
        );
    }

    pub fn disconnect(&mut self, sink: &mut dyn Sink) {
        if !self.session.is_connected() {
            sink.write("No active session.", Tone::Warn);
            return;
        }
        self.drop_link();
        info!("link closed by user");
        sink.write("Session terminated by user.", Tone::Warn);
    }

    pub fn ls(&self, sink: &mut dyn Sink) {
        let Some(host) = self.session.current_host() else {
            sink.write("Not connected. Use: connect <ip or name>", Tone::Warn);
            return;
        };
        let files = self
            .scenario
            .nodes
            .get(host)
            .map(|n| &n.files)
            .filter(|f| !f.is_empty());
        let Some(files) = files else {
            sink.write("(no files)", Tone::Out);
            return;
        };

        // Top-level files are listed alongside directories, even when a
        // directory shares the file's name.
        let mut tree: Vec<(&str, Option<Vec<&str>>)> = Vec::new();
        for path in files.keys() {
            let Some((dir, name)) = path.split_once('/') else {
                tree.push((path.as_str(), None));
                continue;
            };
            match tree.iter_mut().find(|(d, names)| *d == dir && names.is_some()) {
                Some((_, Some(names))) => names.push(name),
                _ => tree.push((dir, Some(vec![name]))),
            }
        }
        for (entry, names) in tree {
            let Some(names) = names else {
                sink.write(entry, Tone::Out);
                continue;
            };
            sink.write(&format!("{}/", entry), Tone::Muted);
            for name in names.into_iter().filter(|n| !n.is_empty()) {
                sink.write(&format!("  {}", name), Tone::Out);
            }
        }
    }

    pub fn cat(&self, path: &str, sink: &mut dyn Sink) {
        let Some(host) = self.session.current_host() else {
            sink.write("Not connected.", Tone::Warn);
            return;
        };
        match self.scenario.file(host, path) {
            None => sink.write("No such file here.", Tone::Err),
            Some(FileEntry::Text(content)) => {
                sink.write(&format!("----- {} -----", path), Tone::Muted);
                sink.write(content, Tone::Out);
                sink.write("----- end -----", Tone::Muted);
            }
            Some(FileEntry::Image { src, caption }) => {
                sink.show_image(src, caption.as_deref());
                if let Some(caption) = caption {
                    sink.write(caption, Tone::Muted);
                }
            }
        }
    }

    /// Decode a file on the current node, or the argument itself.
    ///
    /// Image files cannot be decoded and report a decode failure. A decoded
    /// `CODE: dddd` / `PBQR: dddd` marker is submitted automatically.
    pub fn decode(&mut self, codec: &str, arg: &str, sink: &mut dyn Sink) {
        let Some(codec) = Codec::parse(codec) else {
            sink.write("Unknown decoder. Use base64 or rot13", Tone::Warn);
            return;
        };
        let file = self
            .session
            .current_host()
            .and_then(|host| self.scenario.file(host, arg));
        let source = match file {
            Some(FileEntry::Text(content)) => Some(content.as_str()),
            Some(FileEntry::Image { .. }) => None,
            None => Some(arg),
        };
        let Some(decoded) = source.and_then(|text| codec.decode(text)) else {
            sink.write(&format!("{} decode failed.", codec.label()), Tone::Err);
            return;
        };

        sink.write(&format!("[decoded {}]", codec.label()), Tone::Muted);
        sink.write(&decoded, Tone::Success);
        if let Some(code) = decode::find_code_marker(&decoded) {
            debug!(code, "auto-submitting decoded marker");
            self.submit(code, sink);
        }
    }

    pub fn status(&self, now: Instant, sink: &mut dyn Sink) {
        match &self.session.link {
            Link::Connected { host, .. } => sink.write(
                &format!(
                    "Status: connected / {} · time left {}",
                    host,
                    fmt_clock(self.session.time_remaining(now))
                ),
                Tone::Out,
            ),
            Link::Connecting { host, .. } => sink.write(
                &format!("Status: connecting / {} (link not yet established).", host),
                Tone::Out,
            ),
            Link::Idle => sink.write("Status: idle (no active session).", Tone::Out),
        }
        for key in self.scenario.codes.keys() {
            let state = if self.session.progress.is_found(key) {
                "complete"
            } else {
                "pending"
            };
            sink.write(
                &format!("{}: {}", self.scenario.display_label(key), state),
                Tone::Out,
            );
        }
        sink.write(&self.progress_line(now), Tone::Muted);
    }

    pub fn submit(&mut self, code: &str, sink: &mut dyn Sink) {
        match self.session.progress.submit(&self.scenario.codes, code) {
            Submission::Malformed => {
                sink.write("Submit requires a 4-digit number.", Tone::Warn);
                return;
            }
            Submission::Rejected => sink.write("Code rejected.", Tone::Err),
            Submission::Accepted { newly_found } => {
                for key in newly_found {
                    info!(%key, "code accepted");
                    sink.write(
                        &format!("{} code accepted.", self.scenario.display_label(&key)),
                        Tone::Success,
                    );
                }
            }
        }
        self.check_victory(sink);
    }

    pub fn hint(&mut self, sink: &mut dyn Sink) {
        let context = match self.session.current_host() {
            Some(host) if self.scenario.hints.contains_key(host) => host.to_string(),
            _ => GLOBAL_HINTS.to_string(),
        };
        let hints = self.scenario.hints_for(&context);
        match self.session.hints.next(&context, hints) {
            Some(hint) => sink.write(&format!("Hint: {}", hint), Tone::Muted),
            None => sink.write("No more hints available.", Tone::Warn),
        }
    }

    pub fn reset(&mut self, sink: &mut dyn Sink) {
        self.clear_session(sink);
        info!("exercise reset");
        sink.write("Exercise state reset.", Tone::Warn);
    }

    pub fn run(&mut self, file: Option<&str>, sink: &mut dyn Sink) {
        let Some(file) = file else {
            sink.write("Usage: run <scenario file>", Tone::Warn);
            let files: Vec<String> = self.source.catalogue().into_iter().map(|m| m.file).collect();
            if !files.is_empty() {
                sink.write(&format!("Available scenarios: {}", files.join(", ")), Tone::Muted);
            }
            return;
        };
        match self.source.fetch(file) {
            Ok(scenario) => self.load_scenario(scenario, sink),
            Err(e) => {
                warn!(file, error = %e, "scenario load failed");
                sink.write(&format!("Scenario load failed: {}", e), Tone::Err);
            }
        }
    }

    /// "2 / 3 codes", plus the session clock while connected.
    pub fn progress_line(&self, now: Instant) -> String {
        let found = self.session.progress.found().len();
        let mut line = format!("{} / {} codes", found, self.scenario.codes.len());
        let left = self.session.time_remaining(now);
        if self.session.is_connected() && !left.is_zero() {
            line.push_str(&format!(" · session {} remaining", fmt_clock(left)));
        }
        line
    }

    /// Console prompt; hidden hosts show as `?`.
    pub fn prompt(&self) -> String {
        match self.session.current_host() {
            Some(host) => {
                let visible = self.scenario.nodes.get(host).is_some_and(|n| n.visible);
                format!("echo@ops/{}", if visible { host } else { "?" })
            }
            None => "echo@ops/".to_string(),
        }
    }

    fn check_victory(&mut self, sink: &mut dyn Sink) {
        if !self.session.progress.take_victory(&self.scenario.codes) {
            return;
        }
        info!(id = %self.scenario.id, "scenario complete");
        sink.write(RULE, Tone::Muted);
        let message = self
            .scenario
            .complete_message
            .as_deref()
            .unwrap_or(DEFAULT_COMPLETE);
        sink.write(message, Tone::Success);
        for (key, code) in &self.scenario.codes {
            sink.write(
                &format!(
                    "{}: {}{}",
                    self.scenario.display_label(key),
                    code,
                    self.scenario.grid_suffix(key)
                ),
                Tone::Success,
            );
        }
        sink.write(RULE, Tone::Muted);
    }

    fn clear_session(&mut self, sink: &mut dyn Sink) {
        self.schedule.clear();
        self.session.reset();
        sink.hide_image();
    }

    fn drop_link(&mut self) {
        if let Some(countdown) = self.session.take_countdown() {
            self.schedule.cancel(countdown);
        }
        let retired = self.session.end_link();
        self.schedule.cancel_episode(retired);
    }

    fn fire(&mut self, due: Due, sink: &mut dyn Sink) {
        if !self.session.is_current(due.ticket) {
            debug!(task = ?due.task, "dropping stale timer");
            return;
        }
        let at = due.at;
        match due.task {
            Task::ScanReport => self.scan_report(sink),
            Task::ProbeTimeout => {
                sink.write("No response, target filtered or offline.", Tone::Err)
            }
            Task::Stage(stage) => {
                let Link::Connecting { stage: current, .. } = &mut self.session.link else {
                    return;
                };
                *current = Some(stage);
                sink.write(stage.message(), Tone::Muted);
                let (delay, next) = match stage {
                    Stage::Probing => {
                        (self.timings.handshake_delay(), Task::Stage(Stage::Handshake))
                    }
                    Stage::Handshake => {
                        (self.timings.elevate_delay(), Task::Stage(Stage::Elevating))
                    }
                    Stage::Elevating => (self.timings.establish_delay(), Task::Establish),
                };
                self.schedule
                    .push(at + delay, self.session.link_ticket(), next);
            }
            Task::Establish => {
                let Link::Connecting { host, .. } = &self.session.link else {
                    return;
                };
                let host = host.clone();
                let ends_at = at + self.timings.intrusion_limit();
                self.session.link = Link::Connected {
                    host: host.clone(),
                    ends_at,
                };
                let id = self.schedule.push(
                    at + self.timings.tick(),
                    self.session.link_ticket(),
                    Task::Countdown,
                );
                self.session.set_countdown(id);
                info!(%host, "link established");
                let banner = self
                    .scenario
                    .nodes
                    .get(&host)
                    .map(|n| n.banner.as_str())
                    .unwrap_or_default();
                sink.write(&format!("→ {}", banner), Tone::Host);
            }
            Task::Countdown => {
                let Some(ends_at) = self.session.session_ends_at() else {
                    return;
                };
                if at >= ends_at {
                    self.drop_link();
                    warn!("intrusion limit reached, link dropped");
                    sink.write(INTRUSION_REASON, Tone::Err);
                } else {
                    let id = self.schedule.push(
                        at + self.timings.tick(),
                        self.session.link_ticket(),
                        Task::Countdown,
                    );
                    self.session.set_countdown(id);
                }
            }
        }
    }

    fn scan_report(&self, sink: &mut dyn Sink) {
        let visible: Vec<(&String, &Node)> = self
            .scenario
            .nodes
            .iter()
            .filter(|(_, node)| node.visible)
            .collect();
        if visible.is_empty() {
            sink.write(
                "No broadcast beacons detected. Field reconnaissance may be required.",
                Tone::Warn,
            );
            sink.write(
                "Tip: look for a target address in recovered notes.",
                Tone::Muted,
            );
            return;
        }
        for (key, node) in visible {
            let name = if node.name.is_empty() { key } else { &node.name };
            sink.write(&format!("• Found host: {}  ({})", key, name), Tone::Out);
        }
    }
}

/// Four dot-separated groups of one to three digits.
fn is_ipv4_literal(target: &str) -> bool {
    let groups: Vec<&str> = target.split('.').collect();
    groups.len() == 4
        && groups
            .iter()
            .all(|g| (1..=3).contains(&g.len()) && g.bytes().all(|b| b.is_ascii_digit()))
}
