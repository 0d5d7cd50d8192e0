//! 注册命令管理：注册、注销、按会话清理与分发。
//!
//! 分发期间不会对列表做结构性修改：此时的删除只进入待删除集合（trash can），
//! 遍历结束后统一清理。处理器因此可以在被调用时注销自己或其他命令。

use std::collections::HashSet;

use tracing::{debug, trace};

use super::acl::Authorizer;
use super::models::{
    Client, CommandEntry, CommandError, CommandId, CommandInfo, split_arguments, truncate_key,
};
use crate::script::{ArgValue, CommandHost, FunctionRef, SessionId};

#[derive(Debug, Default)]
pub struct RegisteredCommands {
    commands: Vec<CommandEntry>,
    trash_can: HashSet<CommandId>,
    // 分发可能重入（处理器里再分发命令），只有最外层结束时才清理
    iterating_depth: usize,
    next_id: u64,
}

impl RegisteredCommands {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_iterating(&self) -> bool {
        self.iterating_depth > 0
    }

    fn is_live(&self, entry: &CommandEntry) -> bool {
        !self.trash_can.contains(&entry.id)
    }

    /// 注册命令；同一会话、同一命令键、同一处理器已存在时返回 `Ok(false)`。
    pub fn add_command(
        &mut self,
        session: SessionId,
        key: &str,
        handler: FunctionRef,
        restricted: bool,
        case_sensitive: bool,
    ) -> Result<bool, CommandError> {
        if key.is_empty() {
            return Err(CommandError::EmptyKey);
        }
        let key = truncate_key(key);

        let duplicate = self.commands.iter().any(|e| {
            self.is_live(e) && e.session == session && e.handler == handler && e.matches_key(&key)
        });
        if duplicate {
            return Ok(false);
        }

        let id = CommandId(self.next_id);
        self.next_id += 1;
        debug!(%session, key = %key, restricted, case_sensitive, "命令已注册");
        self.commands.push(CommandEntry {
            id,
            session,
            key,
            handler,
            restricted,
            case_sensitive,
        });
        Ok(true)
    }

    /// 注销会话下匹配命令键的所有条目；给出处理器时只注销该处理器的条目。
    pub fn remove_command(
        &mut self,
        session: SessionId,
        key: &str,
        handler: Option<FunctionRef>,
    ) -> Result<bool, CommandError> {
        if key.is_empty() {
            return Err(CommandError::EmptyKey);
        }
        let key = truncate_key(key);

        let doomed: Vec<CommandId> = self
            .commands
            .iter()
            .filter(|e| self.is_live(e) && e.session == session && e.matches_key(&key))
            .filter(|e| handler.is_none_or(|h| h == e.handler))
            .map(|e| e.id)
            .collect();

        for id in &doomed {
            self.discard(*id);
        }
        Ok(!doomed.is_empty())
    }

    /// 会话销毁时清理其全部命令。
    pub fn clean_up_for_session(&mut self, session: SessionId) -> usize {
        let doomed: Vec<CommandId> = self
            .commands
            .iter()
            .filter(|e| self.is_live(e) && e.session == session)
            .map(|e| e.id)
            .collect();
        for id in &doomed {
            self.discard(*id);
        }
        if !doomed.is_empty() {
            debug!(%session, removed = doomed.len(), "会话的注册命令已清理");
        }
        doomed.len()
    }

    pub fn clear_commands(&mut self) {
        if self.is_iterating() {
            let ids: Vec<CommandId> = self.commands.iter().map(|e| e.id).collect();
            self.trash_can.extend(ids);
        } else {
            self.commands.clear();
            self.trash_can.clear();
        }
    }

    fn discard(&mut self, id: CommandId) {
        if self.is_iterating() {
            self.trash_can.insert(id);
        } else {
            self.commands.retain(|e| e.id != id);
        }
    }

    fn take_out_the_trash(&mut self) {
        if self.trash_can.is_empty() {
            return;
        }
        let trash = std::mem::take(&mut self.trash_can);
        self.commands.retain(|e| !trash.contains(&e.id));
        trace!(removed = trash.len(), "待删除命令已清理");
    }

    /// 命令是否存在；未给出会话时匹配任意会话。
    pub fn command_exists(&self, key: &str, session: Option<SessionId>) -> bool {
        self.get_command(key, session).is_some()
    }

    pub fn get_command(&self, key: &str, session: Option<SessionId>) -> Option<&CommandEntry> {
        let key = truncate_key(key);
        self.commands.iter().find(|e| {
            self.is_live(e) && e.matches_key(&key) && session.is_none_or(|s| s == e.session)
        })
    }

    /// 分发一条命令。
    ///
    /// 所有匹配的条目都会被调用（不是首个匹配即止）。本次遍历中已注销的条目不再调用，
    /// 遍历中新增的条目不参与本次遍历。返回是否有处理器被调用。
    pub fn process_command(
        &mut self,
        key: &str,
        arguments: &str,
        client: Option<&Client>,
        acl: &dyn Authorizer,
        host: &mut dyn CommandHost,
    ) -> Result<bool, CommandError> {
        if key.is_empty() {
            return Err(CommandError::EmptyKey);
        }
        let key = truncate_key(key);

        let mut handled = false;
        let end = self.commands.len();
        self.iterating_depth += 1;

        for index in 0..end {
            let entry = &self.commands[index];
            if !self.is_live(entry) || !entry.matches_key(&key) {
                continue;
            }

            // 受限命令默认拒绝，除非有显式授权
            let allowed = match client {
                Some(c) => acl.can_use_command(&c.account_name, &entry.key, !entry.restricted),
                None => !entry.restricted,
            };
            if !allowed {
                debug!(key = %entry.key, session = %entry.session, "命令无权使用");
                continue;
            }

            let session = entry.session;
            let handler = entry.handler;
            let args = handler_arguments(client, &entry.key, arguments);
            host.call_command_handler(self, session, handler, args);
            handled = true;
        }

        self.iterating_depth -= 1;
        if !self.is_iterating() {
            self.take_out_the_trash();
        }
        Ok(handled)
    }

    /// 全部命令 `(key, session)`，按注册顺序。
    pub fn commands(&self) -> Vec<CommandInfo> {
        self.commands
            .iter()
            .filter(|e| self.is_live(e))
            .map(|e| CommandInfo {
                key: e.key.clone(),
                session: e.session,
            })
            .collect()
    }

    pub fn commands_for_session(&self, session: SessionId) -> Vec<String> {
        self.commands
            .iter()
            .filter(|e| self.is_live(e) && e.session == session)
            .map(|e| e.key.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.commands.iter().filter(|e| self.is_live(e)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn handler_arguments(client: Option<&Client>, key: &str, arguments: &str) -> Vec<ArgValue> {
    let mut args = vec![
        client.map(Client::to_argument).unwrap_or(ArgValue::Bool(false)),
        ArgValue::from(key),
    ];
    args.extend(split_arguments(arguments).map(ArgValue::from));
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::acl::StaticAcl;
    use crate::commands::models::MAX_REGISTERED_COMMAND_LENGTH;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<(SessionId, FunctionRef, Vec<ArgValue>)>,
        unregister_self: bool,
    }

    impl CommandHost for Recorder {
        fn call_command_handler(
            &mut self,
            commands: &mut RegisteredCommands,
            session: SessionId,
            handler: FunctionRef,
            args: Vec<ArgValue>,
        ) {
            if self.unregister_self
                && let Some(ArgValue::String(key)) = args.get(1)
            {
                commands.remove_command(session, key, Some(handler)).unwrap();
            }
            self.calls.push((session, handler, args));
        }
    }

    #[test]
    fn duplicate_triple_is_refused() {
        let mut cmds = RegisteredCommands::new();
        assert!(cmds.add_command(SessionId(1), "kill", FunctionRef(1), false, false).unwrap());
        assert!(!cmds.add_command(SessionId(1), "KILL", FunctionRef(1), false, false).unwrap());
        assert!(cmds.add_command(SessionId(1), "kill", FunctionRef(2), false, false).unwrap());
        assert!(cmds.add_command(SessionId(2), "kill", FunctionRef(1), false, false).unwrap());
        assert_eq!(cmds.len(), 3);
    }

    #[test]
    fn empty_key_is_a_reported_error() {
        let mut cmds = RegisteredCommands::new();
        assert_eq!(
            cmds.add_command(SessionId(1), "", FunctionRef(1), false, false),
            Err(CommandError::EmptyKey)
        );
        assert_eq!(
            cmds.remove_command(SessionId(1), "", None),
            Err(CommandError::EmptyKey)
        );
    }

    #[test]
    fn long_keys_are_truncated() {
        let mut cmds = RegisteredCommands::new();
        let long = "x".repeat(MAX_REGISTERED_COMMAND_LENGTH + 10);
        cmds.add_command(SessionId(1), &long, FunctionRef(1), false, true).unwrap();
        assert_eq!(cmds.commands()[0].key.len(), MAX_REGISTERED_COMMAND_LENGTH);
        assert!(cmds.command_exists(&long, None));
        assert!(cmds.remove_command(SessionId(1), &long, None).unwrap());
    }

    #[test]
    fn remove_honours_case_setting_and_handler() {
        let mut cmds = RegisteredCommands::new();
        cmds.add_command(SessionId(1), "Go", FunctionRef(1), false, true).unwrap();
        cmds.add_command(SessionId(1), "go", FunctionRef(2), false, false).unwrap();

        assert!(!cmds.remove_command(SessionId(1), "GO", Some(FunctionRef(1))).unwrap());
        assert!(cmds.remove_command(SessionId(1), "GO", None).unwrap());
        assert_eq!(cmds.commands_for_session(SessionId(1)), vec!["Go".to_string()]);
        assert!(!cmds.remove_command(SessionId(2), "Go", None).unwrap());
    }

    #[test]
    fn dispatch_splits_arguments_on_spaces() {
        let mut cmds = RegisteredCommands::new();
        cmds.add_command(SessionId(1), "say", FunctionRef(1), false, false).unwrap();
        let mut host = Recorder::default();
        let client = Client::player(9, "alice");

        let handled = cmds
            .process_command("say", "hello  big world", Some(&client), &StaticAcl::default(), &mut host)
            .unwrap();
        assert!(handled);
        assert_eq!(
            host.calls[0].2,
            vec![
                ArgValue::Element(9),
                ArgValue::from("say"),
                ArgValue::from("hello"),
                ArgValue::from("big"),
                ArgValue::from("world"),
            ]
        );
    }

    #[test]
    fn restricted_command_needs_explicit_grant() {
        let mut cmds = RegisteredCommands::new();
        cmds.add_command(SessionId(1), "ban", FunctionRef(1), true, false).unwrap();
        let mut host = Recorder::default();
        let mut acl = StaticAcl::default();
        let alice = Client::player(1, "alice");

        assert!(!cmds.process_command("ban", "", Some(&alice), &acl, &mut host).unwrap());
        assert!(!cmds.process_command("ban", "", None, &acl, &mut host).unwrap());

        acl.set("alice", "ban", true);
        assert!(cmds.process_command("ban", "", Some(&alice), &acl, &mut host).unwrap());
        assert_eq!(host.calls.len(), 1);
    }

    #[test]
    fn missing_client_is_passed_as_false() {
        let mut cmds = RegisteredCommands::new();
        cmds.add_command(SessionId(1), "ping", FunctionRef(1), false, false).unwrap();
        let mut host = Recorder::default();
        cmds.process_command("ping", "", None, &StaticAcl::default(), &mut host)
            .unwrap();
        assert_eq!(
            host.calls[0].2,
            vec![ArgValue::Bool(false), ArgValue::from("ping")]
        );
    }

    #[test]
    fn handler_can_unregister_itself_mid_dispatch() {
        let mut cmds = RegisteredCommands::new();
        for (s, f) in [(1, 1), (2, 2), (3, 3)] {
            cmds.add_command(SessionId(s), "once", FunctionRef(f), false, false).unwrap();
        }
        let mut host = Recorder {
            unregister_self: true,
            ..Recorder::default()
        };

        let handled = cmds
            .process_command("once", "", None, &StaticAcl::default(), &mut host)
            .unwrap();
        assert!(handled);
        let fired: Vec<i32> = host.calls.iter().map(|(_, f, _)| f.0).collect();
        assert_eq!(fired, vec![1, 2, 3]);
        assert!(cmds.is_empty());
        assert!(!cmds.is_iterating());
    }

    #[test]
    fn session_cleanup_leaves_other_sessions() {
        let mut cmds = RegisteredCommands::new();
        cmds.add_command(SessionId(1), "a", FunctionRef(1), false, false).unwrap();
        cmds.add_command(SessionId(2), "a", FunctionRef(1), false, false).unwrap();
        cmds.add_command(SessionId(1), "b", FunctionRef(2), false, false).unwrap();

        assert_eq!(cmds.clean_up_for_session(SessionId(1)), 2);
        assert_eq!(
            cmds.commands(),
            vec![CommandInfo {
                key: "a".into(),
                session: SessionId(2)
            }]
        );
    }
}
