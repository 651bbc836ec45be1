use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::output::{Tone, Transcript};
use super::session::Link;
use super::*;
use crate::scenario::{LoadError, ScenarioMeta};

const OPERATION: &str = r#"{
    "id": "shadow-signal",
    "title": "OP SHADOW SIGNAL",
    "objective": "Find two 4-digit codes.",
    "codes": { "alpha": "5021", "bravo": "7749" },
    "nodes": {
        "alpha": {
            "name": "relay-alpha",
            "banner": "ALPHA up.",
            "ip": "10.0.4.17",
            "visible": true,
            "grid": "C-7",
            "files": {
                "ops/a.msg": "Q09ERTogNTAyMQ==",
                "ops/orders.txt": "Hold position.",
                "maps/grid.png": { "image": "img/grid.png", "caption": "Sector grid" }
            }
        },
        "bravo": {
            "name": "store-bravo",
            "banner": "BRAVO up.",
            "ip": "10.0.9.3",
            "files": { "intel/b.enc": "FRPERG: 7749", "intel/c.enc": "PBQR: 7749" }
        }
    },
    "hints": {
        "global": ["Scan the network.", "Addresses hide in notes."],
        "alpha": ["Base64 is your friend."]
    },
    "completeMessage": "Lock box open."
}"#;

#[derive(Default)]
struct MemorySource {
    files: HashMap<String, String>,
}

impl ScenarioSource for MemorySource {
    fn fetch(&self, file: &str) -> Result<Scenario, LoadError> {
        let text = self
            .files
            .get(file)
            .ok_or_else(|| LoadError::Unsupported(file.into()))?;
        serde_json::from_str(text).map_err(|source| LoadError::Malformed {
            path: file.into(),
            source,
        })
    }

    fn catalogue(&self) -> Vec<ScenarioMeta> {
        let mut files: Vec<&String> = self.files.keys().collect();
        files.sort();
        files
            .into_iter()
            .map(|f| ScenarioMeta {
                id: f.clone(),
                title: f.clone(),
                objective: String::new(),
                file: f.clone(),
            })
            .collect()
    }
}

struct Harness {
    engine: Engine,
    out: Transcript,
    now: Instant,
}

impl Harness {
    fn new() -> Self {
        let mut source = MemorySource::default();
        source.files.insert("op.json".into(), OPERATION.into());
        let mut h = Harness {
            engine: Engine::new(Timings::default(), Box::new(source)),
            out: Transcript::new(),
            now: Instant::now(),
        };
        let scenario = serde_json::from_str(OPERATION).unwrap();
        h.engine.load_scenario(scenario, &mut h.out);
        h
    }

    fn run(&mut self, line: &str) {
        self.engine.handle_line(line, self.now, &mut self.out);
    }

    fn wait(&mut self, ms: u64) {
        self.now += Duration::from_millis(ms);
        self.engine.advance(self.now, &mut self.out);
    }

    fn connect(&mut self, target: &str) {
        self.run(&format!("connect {}", target));
        self.wait(Timings::default().handshake_total().as_millis() as u64);
    }

    fn link(&self) -> &Link {
        &self.engine.session().link
    }
}

#[test]
fn end_to_end_operation() {
    let mut h = Harness::new();
    h.connect("alpha");
    assert!(h.out.contains("→ ALPHA up."));

    h.run("decode base64 ops/a.msg");
    assert!(h.out.contains("CODE: 5021"));
    assert!(h.out.contains("relay-alpha code accepted."));
    assert!(h.engine.session().progress.is_found("alpha"));
    assert!(!h.out.contains("Lock box open."));

    h.run("submit 7749");
    assert!(h.out.contains("Node 2 code accepted."));
    assert_eq!(h.out.count("Lock box open."), 1);
    assert!(h.out.contains("relay-alpha: 5021 @ C-7"));
    assert_eq!(h.out.count("Node 2: 7749"), 1);
    assert!(!h.out.contains("Node 2: 7749 @"));

    // victory is announced once
    h.run("submit 7749");
    h.run("status");
    assert_eq!(h.out.count("Lock box open."), 1);
}

#[test]
fn oversized_timings_do_not_overflow() {
    let timings = Timings {
        connect_delay_ms: u64::MAX,
        intrusion_limit_ms: u64::MAX,
        scan_delay_ms: u64::MAX,
        ..Timings::default()
    };
    let mut engine = Engine::new(timings, Box::new(MemorySource::default()));
    let mut out = Transcript::new();
    let now = Instant::now();
    engine.load_scenario(serde_json::from_str(OPERATION).unwrap(), &mut out);
    engine.handle_line("scan", now, &mut out);
    engine.handle_line("connect alpha", now, &mut out);
    assert!(engine.next_due().is_some_and(|due| due > now));

    engine.advance(now + timings.handshake_total(), &mut out);
    assert!(engine.session().is_connected());
    assert!(out.contains("→ ALPHA up."));
}

#[test]
fn staged_handshake_timing() {
    let mut h = Harness::new();
    h.run("connect alpha");
    assert!(h.out.contains("Connecting to alpha …"));
    assert!(matches!(h.link(), Link::Connecting { stage: None, .. }));

    h.wait(2199);
    assert!(!h.out.contains("Probing…"));
    h.wait(1);
    assert_eq!(h.out.last(), Some("Probing…"));
    assert!(matches!(
        h.link(),
        Link::Connecting { stage: Some(Stage::Probing), .. }
    ));
    h.wait(700);
    assert_eq!(h.out.last(), Some("Handshake…"));
    h.wait(700);
    assert_eq!(h.out.last(), Some("Elevating…"));
    assert!(!h.engine.session().is_connected());
    h.wait(400);
    assert_eq!(h.engine.session().current_host(), Some("alpha"));
    assert_eq!(
        h.engine.session().session_ends_at(),
        Some(h.now + Duration::from_millis(90_000))
    );
    assert_eq!(h.engine.prompt(), "echo@ops/alpha");
}

#[test]
fn one_large_jump_runs_every_stage_in_order() {
    let mut h = Harness::new();
    h.run("connect alpha");
    h.wait(10_000);
    let stages: Vec<&str> = h
        .out
        .lines()
        .iter()
        .map(|(l, _)| l.as_str())
        .filter(|l| l.ends_with('…') || l.starts_with('→'))
        .collect();
    assert_eq!(
        stages,
        vec!["Connecting to alpha …", "Probing…", "Handshake…", "Elevating…", "→ ALPHA up."]
    );
    assert!(h.engine.session().is_connected());
}

#[test]
fn connect_by_address() {
    let mut h = Harness::new();
    h.run("connect 10.0.4.17");
    assert!(h.out.contains("Connecting to 10.0.4.17 (alpha) …"));
    h.wait(4000);
    h.run("disconnect");

    h.run("connect 10.0.9.3");
    assert!(h.out.contains("Connecting to 10.0.9.3 …"));
    h.wait(4000);
    assert_eq!(h.engine.session().current_host(), Some("bravo"));
    assert_eq!(h.engine.prompt(), "echo@ops/?");
}

#[test]
fn unresolvable_targets_leave_state_alone() {
    let mut h = Harness::new();
    h.run("connect 192.168.1.1");
    assert!(h.out.contains("Attempting connection to 192.168.1.1 …"));
    assert_eq!(h.link(), &Link::Idle);
    h.wait(1099);
    assert!(!h.out.contains("No response"));
    h.wait(1);
    assert_eq!(h.out.last(), Some("No response, target filtered or offline."));
    assert_eq!(h.link(), &Link::Idle);

    h.run("connect charlie");
    assert!(h.out.contains("Unknown target."));
    h.run("connect 10.0.4");
    assert_eq!(h.link(), &Link::Idle);
    assert_eq!(h.engine.session().session_ends_at(), None);
    assert!(h.engine.next_due().is_none());
}

#[test]
fn second_connect_is_rejected() {
    let mut h = Harness::new();
    h.run("connect alpha");
    h.run("connect bravo");
    assert!(h.out.contains("A session is already active."));
    h.wait(4000);
    assert_eq!(h.engine.session().current_host(), Some("alpha"));

    h.run("connect bravo");
    assert_eq!(h.out.count("A session is already active."), 2);
    assert_eq!(h.engine.session().current_host(), Some("alpha"));
}

#[test]
fn disconnect_while_connecting_is_rejected() {
    let mut h = Harness::new();
    h.run("connect alpha");
    h.wait(2500);
    h.run("disconnect");
    assert_eq!(h.out.last(), Some("No active session."));
    h.wait(2000);
    assert!(h.engine.session().is_connected());
}

#[test]
fn intrusion_timer_forces_disconnect() {
    let mut h = Harness::new();
    h.connect("alpha");
    h.wait(89_000);
    assert!(h.engine.session().is_connected());
    assert!(h.engine.progress_line(h.now).contains("session 00:01 remaining"));

    h.wait(1000);
    assert_eq!(h.link(), &Link::Idle);
    assert_eq!(h.out.last(), Some("Intrusion detected. Link dropped."));
    assert!(!h.out.contains("Session terminated by user."));
    assert!(h.engine.next_due().is_none());

    let lines = h.out.lines().len();
    h.wait(10_000);
    assert_eq!(h.out.lines().len(), lines);
}

#[test]
fn user_disconnect_stops_countdown() {
    let mut h = Harness::new();
    h.connect("alpha");
    h.wait(5000);
    h.run("disconnect");
    assert_eq!(h.out.last(), Some("Session terminated by user."));
    assert_eq!(h.engine.session().current_host(), None);
    assert!(h.engine.next_due().is_none());
    h.wait(100_000);
    assert!(!h.out.contains("Intrusion detected."));
    h.run("disconnect");
    assert_eq!(h.out.last(), Some("No active session."));
}

#[test]
fn reset_cancels_pending_handshake() {
    let mut h = Harness::new();
    h.run("submit 5021");
    h.run("connect alpha");
    h.wait(2200);
    h.run("reset");
    assert_eq!(h.out.last(), Some("Exercise state reset."));
    h.wait(60_000);
    assert!(!h.out.contains("Handshake…"));
    assert_eq!(h.link(), &Link::Idle);
    assert!(h.engine.session().progress.found().is_empty());

    // a fresh connect after reset works normally
    h.connect("bravo");
    assert_eq!(h.engine.session().current_host(), Some("bravo"));
}

#[test]
fn stale_timer_is_ignored() {
    let mut h = Harness::new();
    h.run("connect alpha");
    let ticket = h.engine.session.link_ticket();
    h.run("reset");
    h.engine
        .schedule
        .push(h.now, ticket, Task::Stage(Stage::Handshake));
    h.engine
        .schedule
        .push(h.now, ticket, Task::Establish);
    h.wait(0);
    assert!(!h.out.contains("Handshake…"));
    assert_eq!(h.link(), &Link::Idle);
}

#[test]
fn scan_reports_after_delay() {
    let mut h = Harness::new();
    h.run("scan");
    assert_eq!(h.out.last(), Some("Running passive scan…"));
    h.wait(299);
    assert!(!h.out.contains("Found host"));
    h.wait(1);
    assert!(h.out.contains("• Found host: alpha  (relay-alpha)"));
    assert!(!h.out.contains("Found host: bravo"));
}

#[test]
fn ls_and_cat() {
    let mut h = Harness::new();
    h.run("ls");
    assert_eq!(h.out.last(), Some("Not connected. Use: connect <ip or name>"));
    h.run("cat ops/a.msg");
    assert_eq!(h.out.last(), Some("Not connected."));

    h.connect("alpha");
    h.run("ls");
    let tail: Vec<&str> = h.out.lines()[h.out.lines().len() - 5..]
        .iter()
        .map(|(l, _)| l.as_str())
        .collect();
    assert_eq!(tail, vec!["maps/", "  grid.png", "ops/", "  a.msg", "  orders.txt"]);

    h.run("cat ops/orders.txt");
    assert!(h.out.contains("----- ops/orders.txt -----"));
    assert!(h.out.contains("Hold position."));
    assert_eq!(h.out.last(), Some("----- end -----"));

    h.run("cat maps/grid.png");
    assert_eq!(h.out.image().map(|i| i.src.as_str()), Some("img/grid.png"));
    assert_eq!(h.out.last(), Some("Sector grid"));

    h.run("cat nope");
    assert_eq!(h.out.last(), Some("No such file here."));
    h.run("cat");
    assert_eq!(h.out.last(), Some("Usage: cat <path>"));
}

#[test]
fn ls_lists_file_beside_same_named_directory() {
    let mut h = Harness::new();
    let scenario = serde_json::from_str(
        r#"{
            "codes": { "box": "1234" },
            "nodes": {
                "box": {
                    "name": "box",
                    "visible": true,
                    "files": { "ops": "plain", "ops/x": "nested", "readme": "hi" }
                }
            }
        }"#,
    )
    .unwrap();
    h.engine.load_scenario(scenario, &mut h.out);
    h.connect("box");
    h.run("clear");
    h.run("ls");
    let listed: Vec<&str> = h.out.lines().iter().map(|(l, _)| l.as_str()).collect();
    assert_eq!(listed, vec!["ops", "ops/", "  x", "readme"]);

    h.run("cat ops");
    assert!(h.out.contains("plain"));
}

#[test]
fn decode_literal_text_and_markers() {
    let mut h = Harness::new();
    h.run("decode rot13 Uryyb jbeyq");
    assert_eq!(h.out.last(), Some("Hello world"));

    // "SECRET" is not a marker
    h.run("decode rot13 FRPERG: 7749");
    assert!(h.out.contains("SECRET: 7749"));
    assert!(h.engine.session().progress.found().is_empty());

    h.run("decode rot13 CODE: 7749");
    assert!(h.out.contains("PBQR: 7749"));
    assert!(h.engine.session().progress.is_found("bravo"));
}

#[test]
fn decode_failures() {
    let mut h = Harness::new();
    h.run("decode base64 !!!notbase64");
    assert_eq!(h.out.last(), Some("Base64 decode failed."));
    h.run("decode hex 4142");
    assert_eq!(h.out.last(), Some("Unknown decoder. Use base64 or rot13"));
    h.run("decode base64");
    assert_eq!(h.out.last(), Some("Usage: decode base64|rot13 <x>"));

    h.connect("alpha");
    h.run("decode rot13 maps/grid.png");
    assert_eq!(h.out.last(), Some("ROT13 decode failed."));
}

#[test]
fn file_paths_only_resolve_while_connected() {
    let mut h = Harness::new();
    h.run("decode base64 ops/a.msg");
    assert_eq!(h.out.last(), Some("Base64 decode failed."));
    assert!(h.engine.session().progress.found().is_empty());
}

#[test]
fn malformed_submissions() {
    let mut h = Harness::new();
    for bad in ["submit 12a4", "submit 123"] {
        h.run(bad);
        assert_eq!(h.out.last(), Some("Submit requires a 4-digit number."));
    }
    h.run("submit 0000");
    assert_eq!(h.out.last(), Some("Code rejected."));
    assert!(h.engine.session().progress.found().is_empty());
}

#[test]
fn resubmitting_does_not_repeat_acceptance() {
    let mut h = Harness::new();
    h.run("submit 5021");
    h.run("submit 5021");
    h.run("submit 5021");
    assert_eq!(h.out.count("code accepted."), 1);
    assert_eq!(h.engine.session().progress.found().len(), 1);
}

#[test]
fn hints_follow_context() {
    let mut h = Harness::new();
    h.run("hint");
    assert_eq!(h.out.last(), Some("Hint: Scan the network."));

    h.connect("alpha");
    h.run("hint");
    assert_eq!(h.out.last(), Some("Hint: Base64 is your friend."));
    h.run("hint");
    assert_eq!(h.out.last(), Some("No more hints available."));
    h.run("disconnect");

    // global cursor kept its place across the connection
    h.run("hint");
    assert_eq!(h.out.last(), Some("Hint: Addresses hide in notes."));
    h.run("hint");
    assert_eq!(h.out.last(), Some("No more hints available."));

    // bravo has no list of its own, so global applies
    h.connect("bravo");
    h.run("hint");
    assert_eq!(h.out.last(), Some("No more hints available."));

    h.run("reset");
    h.run("hint");
    assert_eq!(h.out.last(), Some("Hint: Scan the network."));
}

#[test]
fn status_reports_link_and_progress() {
    let mut h = Harness::new();
    h.run("status");
    assert!(h.out.contains("Status: idle (no active session)."));
    assert!(h.out.contains("relay-alpha: pending"));
    assert_eq!(h.out.last(), Some("0 / 2 codes"));

    h.run("submit 5021");
    h.connect("bravo");
    h.wait(30_000);
    h.run("status");
    assert!(h.out.contains("Status: connected / bravo · time left 01:00"));
    assert!(h.out.contains("relay-alpha: complete"));
    assert!(h.out.contains("Node 2: pending"));
    assert_eq!(h.out.last(), Some("1 / 2 codes · session 01:00 remaining"));
}

#[test]
fn unknown_commands_name_the_token() {
    let mut h = Harness::new();
    h.run("Ping 1.2.3.4");
    assert_eq!(h.out.last(), Some("Unknown command: ping (try 'help')"));
    let lines = h.out.lines().len();
    h.run("   ");
    assert_eq!(h.out.lines().len(), lines);
}

#[test]
fn help_and_clear() {
    let mut h = Harness::new();
    h.run("HELP");
    assert!(h.out.contains("Available commands:"));
    assert!(h.out.contains("connect <ip|name>"));
    h.run("clear");
    assert!(h.out.lines().is_empty());
}

#[test]
fn boot_banner_and_prompt() {
    let mut out = Transcript::new();
    let engine = Engine::new(Timings::default(), Box::new(MemorySource::default()));
    engine.boot(&mut out);
    assert!(out.contains(BOOT_BANNER));
    assert!(out.contains("No scenario loaded."));
    assert_eq!(engine.prompt(), "echo@ops/");

    let mut h = Harness::new();
    h.connect("alpha");
    assert_eq!(h.engine.prompt(), "echo@ops/alpha");
    h.run("disconnect");
    h.connect("10.0.9.3");
    assert_eq!(h.engine.prompt(), "echo@ops/?");
}

#[test]
fn run_loads_and_reports_failures() {
    let mut h = Harness::new();
    h.run("submit 5021");
    h.connect("alpha");

    h.run("load op.json");
    assert_eq!(h.out.count("Loaded scenario: OP SHADOW SIGNAL"), 2);
    assert_eq!(h.link(), &Link::Idle);
    assert!(h.engine.session().progress.found().is_empty());
    assert!(h.engine.next_due().is_none());

    h.run("run missing.json");
    assert!(h.out.last().unwrap().starts_with("Scenario load failed:"));

    h.run("run");
    assert_eq!(h.out.last(), Some("Available scenarios: op.json"));
}

#[test]
fn load_rebuilds_routes_and_hides_image() {
    let mut h = Harness::new();
    h.connect("alpha");
    h.run("cat maps/grid.png");
    assert!(h.out.image().is_some());

    let replacement: Scenario = serde_json::from_str(
        r#"{"id":"solo","codes":{"x":"1234"},"nodes":{"x":{"banner":"X up.","ip":"10.1.1.1"}}}"#,
    )
    .unwrap();
    h.engine.load_scenario(replacement, &mut h.out);
    assert!(h.out.image().is_none());
    assert!(h.out.contains("Loaded scenario: solo"));

    h.run("connect 10.0.4.17");
    assert_eq!(h.link(), &Link::Idle);
    h.connect("10.1.1.1");
    assert_eq!(h.engine.session().current_host(), Some("x"));

    h.run("submit 1234");
    assert!(h.out.contains("MISSION COMPLETE ✅"));
    assert!(h.out.contains("Node 1: 1234"));
}

#[test]
fn code_without_node_still_submits() {
    let mut h = Harness::new();
    let scenario: Scenario =
        serde_json::from_str(r#"{"id":"bare","codes":{"delta":"4444"}}"#).unwrap();
    h.engine.load_scenario(scenario, &mut h.out);
    h.run("submit 4444");
    assert!(h.out.contains("DELTA code accepted."));
    assert!(h.out.contains("DELTA: 4444"));
    assert!(h
        .out
        .lines()
        .iter()
        .any(|(line, tone)| line == "DELTA code accepted." && *tone == Tone::Success));
    assert_eq!(h.out.count("MISSION COMPLETE"), 1);
}
