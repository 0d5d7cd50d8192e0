mod common;

use std::collections::HashMap;

use common::{ScriptedCommandHost, TableAcl, TrustEverything, memory_runtime, memory_runtime_with};
use remote_calls::commands::{Client, CommandError, StaticAcl};
use remote_calls::script::{ArgValue, FunctionRef, SessionId};

const A: SessionId = SessionId(1);
const B: SessionId = SessionId(2);

fn handlers(host: &ScriptedCommandHost) -> Vec<i32> {
    host.calls.iter().map(|(_, h, _)| h.0).collect()
}

#[test]
fn case_insensitive_command_receives_client_and_key() {
    let mut rt = memory_runtime(10);
    assert!(rt.add_command(A, "kill", FunctionRef(1), false, false).unwrap());

    let client = Client::player(42, "alice");
    let mut host = ScriptedCommandHost::default();
    let handled = rt
        .process_command("KILL", "", Some(&client), &mut host)
        .unwrap();

    assert!(handled);
    assert_eq!(
        host.calls,
        vec![(
            A,
            FunctionRef(1),
            vec![ArgValue::Element(42), ArgValue::from("kill")]
        )]
    );
}

#[test]
fn case_sensitive_command_ignores_other_spelling() {
    let mut rt = memory_runtime(10);
    rt.add_command(A, "Kick", FunctionRef(1), false, true).unwrap();

    let mut host = ScriptedCommandHost::default();
    assert!(!rt.process_command("kick", "", None, &mut host).unwrap());
    assert!(rt.process_command("Kick", "", None, &mut host).unwrap());
    assert_eq!(handlers(&host), vec![1]);
}

#[test]
fn arguments_are_split_on_single_spaces() {
    let mut rt = memory_runtime(10);
    rt.add_command(A, "say", FunctionRef(1), false, false).unwrap();

    let mut host = ScriptedCommandHost::default();
    rt.process_command("say", "hello  big world ", None, &mut host)
        .unwrap();
    assert_eq!(
        host.calls[0].2,
        vec![
            ArgValue::Bool(false),
            ArgValue::from("say"),
            ArgValue::from("hello"),
            ArgValue::from("big"),
            ArgValue::from("world"),
        ]
    );
}

#[test]
fn only_authorized_entries_are_invoked() {
    let mut rt = memory_runtime_with(10, Box::new(TrustEverything), Box::new(TableAcl::default()));
    rt.add_command(A, "go", FunctionRef(1), false, false).unwrap();
    rt.add_command(A, "go", FunctionRef(2), true, false).unwrap();
    rt.add_command(B, "go", FunctionRef(3), false, false).unwrap();
    rt.add_command(B, "go", FunctionRef(4), true, false).unwrap();

    let client = Client::player(7, "guest");
    let mut host = ScriptedCommandHost::default();
    assert!(rt.process_command("go", "", Some(&client), &mut host).unwrap());
    assert_eq!(handlers(&host), vec![1, 3]);
}

#[test]
fn explicit_grant_opens_restricted_command() {
    let acl = TableAcl {
        answers: HashMap::from([("admin".to_string(), true), ("guest".to_string(), false)]),
    };
    let mut rt = memory_runtime_with(10, Box::new(TrustEverything), Box::new(acl));
    rt.add_command(A, "ban", FunctionRef(1), true, false).unwrap();

    let mut host = ScriptedCommandHost::default();
    let guest = Client::player(1, "guest");
    let admin = Client::player(2, "admin");
    assert!(!rt.process_command("ban", "", Some(&guest), &mut host).unwrap());
    assert!(rt.process_command("ban", "", Some(&admin), &mut host).unwrap());
    assert_eq!(host.calls.len(), 1);
    assert_eq!(host.calls[0].2[0], ArgValue::Element(2));
}

#[test]
fn restricted_command_without_client_is_refused() {
    let mut rt = memory_runtime(10);
    rt.add_command(A, "shutdown", FunctionRef(1), true, false)
        .unwrap();

    let mut host = ScriptedCommandHost::default();
    assert!(!rt.process_command("shutdown", "", None, &mut host).unwrap());
    assert!(host.calls.is_empty());
}

#[test]
fn static_acl_rules_apply_per_command() {
    let mut acl = StaticAcl::default();
    acl.set("*", "Restart", true);
    let mut rt = memory_runtime_with(10, Box::new(TrustEverything), Box::new(acl));
    rt.add_command(A, "restart", FunctionRef(1), true, false)
        .unwrap();
    rt.add_command(A, "stop", FunctionRef(2), true, false).unwrap();

    let client = Client::console(0);
    let mut host = ScriptedCommandHost::default();
    assert!(rt.process_command("restart", "", Some(&client), &mut host).unwrap());
    assert!(!rt.process_command("stop", "", Some(&client), &mut host).unwrap());
}

#[test]
fn handler_may_unregister_itself_during_dispatch() {
    let mut rt = memory_runtime(10);
    rt.add_command(A, "ping", FunctionRef(1), false, false).unwrap();
    rt.add_command(A, "ping", FunctionRef(2), false, false).unwrap();

    let mut host = ScriptedCommandHost {
        self_removing: vec![FunctionRef(1)],
        ..Default::default()
    };
    assert!(rt.process_command("ping", "", None, &mut host).unwrap());
    assert_eq!(handlers(&host), vec![1, 2]);
    assert_eq!(rt.commands().len(), 1);
    assert!(!rt.commands().is_iterating());

    host.calls.clear();
    rt.process_command("ping", "", None, &mut host).unwrap();
    assert_eq!(handlers(&host), vec![2]);
}

#[test]
fn session_teardown_inside_handler_skips_remaining_entries_of_that_session() {
    let mut rt = memory_runtime(10);
    rt.add_command(A, "x", FunctionRef(1), false, false).unwrap();
    rt.add_command(A, "x", FunctionRef(2), false, false).unwrap();
    rt.add_command(B, "x", FunctionRef(3), false, false).unwrap();

    let mut host = ScriptedCommandHost {
        session_killers: vec![FunctionRef(1)],
        ..Default::default()
    };
    rt.process_command("x", "", None, &mut host).unwrap();

    assert_eq!(handlers(&host), vec![1, 3]);
    assert!(rt.commands().commands_for_session(A).is_empty());
    assert_eq!(rt.commands().commands_for_session(B), vec!["x".to_string()]);
}

#[test]
fn command_added_during_dispatch_waits_for_next_dispatch() {
    let mut rt = memory_runtime(10);
    rt.add_command(A, "spawn", FunctionRef(1), false, false)
        .unwrap();

    let mut host = ScriptedCommandHost::default();
    host.registrars
        .insert(1, ("spawn".to_string(), FunctionRef(9)));

    rt.process_command("spawn", "", None, &mut host).unwrap();
    assert_eq!(handlers(&host), vec![1]);
    assert_eq!(rt.commands().len(), 2);

    host.calls.clear();
    host.registrars.clear();
    rt.process_command("spawn", "", None, &mut host).unwrap();
    assert_eq!(handlers(&host), vec![1, 9]);
}

#[test]
fn duplicate_registration_is_rejected() {
    let mut rt = memory_runtime(10);
    assert!(rt.add_command(A, "dup", FunctionRef(1), false, false).unwrap());
    assert!(!rt.add_command(A, "DUP", FunctionRef(1), false, false).unwrap());
    assert!(rt.add_command(A, "dup", FunctionRef(2), false, false).unwrap());
    assert!(rt.add_command(B, "dup", FunctionRef(1), false, false).unwrap());
    assert_eq!(rt.commands().len(), 3);
}

#[test]
fn remove_without_handler_drops_every_match_in_session() {
    let mut rt = memory_runtime(10);
    rt.add_command(A, "m", FunctionRef(1), false, false).unwrap();
    rt.add_command(A, "m", FunctionRef(2), false, false).unwrap();
    rt.add_command(B, "m", FunctionRef(3), false, false).unwrap();

    assert!(rt.remove_command(A, "M", None).unwrap());
    assert!(!rt.remove_command(A, "m", None).unwrap());
    assert!(!rt.commands().command_exists("m", Some(A)));
    assert!(rt.commands().command_exists("m", None));
}

#[test]
fn long_keys_compare_on_truncated_prefix() {
    let mut rt = memory_runtime(10);
    let long = "a".repeat(70);
    rt.add_command(A, &long, FunctionRef(1), false, false)
        .unwrap();
    assert_eq!(rt.commands().commands()[0].key.len(), 64);

    let other_tail = format!("{}{}", "a".repeat(64), "zzz");
    let mut host = ScriptedCommandHost::default();
    assert!(rt.process_command(&other_tail, "", None, &mut host).unwrap());
}

#[test]
fn empty_key_is_an_error() {
    let mut rt = memory_runtime(10);
    let mut host = ScriptedCommandHost::default();
    assert_eq!(
        rt.add_command(A, "", FunctionRef(1), false, false),
        Err(CommandError::EmptyKey)
    );
    assert_eq!(
        rt.process_command("", "", None, &mut host),
        Err(CommandError::EmptyKey)
    );
}

#[test]
fn stop_session_reports_removed_commands() {
    let mut rt = memory_runtime(10);
    rt.add_command(A, "a", FunctionRef(1), false, false).unwrap();
    rt.add_command(A, "b", FunctionRef(2), false, false).unwrap();
    rt.add_command(B, "c", FunctionRef(3), false, false).unwrap();

    assert_eq!(rt.stop_session(A), (0, 2));
    assert_eq!(rt.commands().len(), 1);
}
