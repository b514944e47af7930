//! Commands every daemon installs: mode changes, commit/rollback and the
//! configuration views
use log::{debug, trace, warn};

use crate::command::{
    apply_fn, handler, ApplyFn, CommandKind, CommandNode, CommandTree, Handler, InstallError,
    Privilege, Token,
};
use crate::commit;
use crate::conf::store::{self, read_lines};
use crate::conf::{config_set, last_token, multi_value_add, split_last_token, ConfNode};
use crate::dispatch::{remove_by_negation, CaptureSession, Context, DispatchError, Session};
use crate::display::OutputTable;

/// Store the line in the candidate configuration
pub fn config_handler() -> Handler {
    handler(|ctx, node, line, _| Ok(config_set(&mut ctx.candidate, node, line)?))
}

/// Append the last token to the values of its parent node
pub fn multi_value_handler() -> Handler {
    handler(|ctx, node, line, _| {
        if !multi_value_add(&mut ctx.candidate, &node.path, line)? {
            debug!("[{}] value already present", line.trim());
        }
        Ok(())
    })
}

/// For configuration that has nothing to push anywhere
pub fn noop_apply() -> ApplyFn {
    apply_fn(|action| {
        trace!("{} [{}]: nothing to apply", action.direction, action.line);
        Ok(())
    })
}

pub fn install_common(tree: &mut CommandTree) -> Result<(), InstallError> {
    use CommandKind::Plain;
    use Privilege::{Enable, Exec};
    let conf = Privilege::Config;

    let commit = handler(cmd_commit);
    let list = handler(cmd_list);
    let rollback = handler(cmd_rollback);
    let show_conf = handler(|ctx, node, _, session| {
        session.sendln("candidate configuration:");
        show_config(&ctx.candidate, node, session);
        Ok(())
    });
    let show_run = handler(|ctx, node, _, session| {
        session.sendln("running configuration:");
        show_config(&ctx.active, node, session);
        Ok(())
    });
    let show_rollback = handler(cmd_show_rollback);

    tree.install(Plain, "commit", conf, commit.clone(), None, "Apply current candidate configuration")?;
    tree.install(
        Plain,
        "commit force",
        conf,
        commit,
        None,
        "Force saving candidate configuration even if unchanged",
    )?;
    tree.install(Plain, "configure", Enable, handler(cmd_configure), None, "Enter configuration mode")?;
    tree.install(Plain, "enable", Exec, handler(cmd_enable), None, "Enter privileged mode")?;
    tree.install(Plain, "exit", Exec, handler(cmd_exit), None, "Exit current location")?;
    tree.install(Plain, "list", Exec, list.clone(), None, "List command tree")?;
    tree.install(
        Plain,
        "list brief",
        Exec,
        list.clone(),
        None,
        "List only nodes with attached handlers",
    )?;
    tree.install(
        Plain,
        "list description",
        Exec,
        list,
        None,
        "List command tree showing descriptions",
    )?;
    tree.install(
        Plain,
        "no {ANY}",
        conf,
        handler(|ctx, _, line, session| Ok(remove_by_negation(ctx, line, session)?)),
        None,
        "Remove this configuration item",
    )?;
    tree.install(Plain, "quit", Exec, handler(cmd_quit), None, "Quit session")?;
    tree.install(
        Plain,
        "rollback",
        conf,
        rollback.clone(),
        None,
        "Reset candidate configuration from active configuration",
    )?;
    tree.install(
        Plain,
        "rollback {COMMITID}",
        conf,
        rollback,
        None,
        "Reset candidate configuration from rollback configuration",
    )?;
    tree.install(
        Plain,
        "show configuration",
        Exec,
        show_conf.clone(),
        None,
        "Show candidate configuration",
    )?;
    tree.install(
        Plain,
        "show configuration compare",
        Exec,
        handler(cmd_show_compare),
        None,
        "Show differences between active and candidate configurations",
    )?;
    tree.install(
        Plain,
        "show configuration rollback",
        Exec,
        show_rollback.clone(),
        None,
        "Show list of saved configurations",
    )?;
    tree.install(
        Plain,
        "show configuration rollback {COMMITID}",
        Exec,
        show_rollback,
        None,
        "Show saved configuration",
    )?;
    tree.install(
        Plain,
        "show configuration tree",
        Exec,
        show_conf,
        None,
        "Show candidate configuration tree",
    )?;
    tree.install(Plain, "show history", Exec, handler(cmd_show_history), None, "Show command history")?;
    tree.install(
        Plain,
        "show running-configuration",
        Exec,
        show_run.clone(),
        None,
        "Show active configuration",
    )?;
    tree.install(
        Plain,
        "show running-configuration tree",
        Exec,
        show_run,
        None,
        "Show active configuration tree",
    )?;
    tree.install(Plain, "show version", Exec, handler(cmd_show_version), None, "Show version")?;
    tree.install(
        CommandKind::Config,
        "username {USERNAME} password (PASSWORD)",
        conf,
        config_handler(),
        Some(noop_apply()),
        "User clear-text password",
    )?;

    tree.describe("no", "Negate a command")?;
    tree.describe("show", "Show running system information")?;
    tree.describe("username", "Configure users")?;
    tree.describe("username {USERNAME}", "User name")?;
    tree.describe("username {USERNAME} password", "Password for user")?;
    Ok(())
}

/// `hostname (HOSTNAME)`, shared by every daemon
pub fn install_hostname(tree: &mut CommandTree) -> Result<(), InstallError> {
    tree.install(
        CommandKind::Config,
        "hostname (HOSTNAME)",
        Privilege::Config,
        config_handler(),
        Some(noop_apply()),
        "Hostname",
    )?;
    tree.describe("hostname", "Assign hostname")
}

fn report_uncommitted(ctx: &Context, session: &mut dyn Session) {
    if ctx.is_changed() {
        session.sendln("candidate configuration has uncommitted changes");
        session.sendln("use: 'commit' to apply changes");
        session.sendln("     'rollback' to discard uncommitted changes");
        session.sendln("     'show configuration compare' to view uncommitted changes");
    }
}

fn cmd_commit(
    ctx: &mut Context,
    node: &CommandNode,
    _line: &str,
    session: &mut dyn Session,
) -> Result<(), DispatchError> {
    let force = node.label == "force";
    let changed = ctx.is_changed();
    let report = commit::commit(ctx)?;
    session.sendln(&format!(
        "commit: {} unit(s) removed, {} added, {} action(s) applied",
        report.removed, report.added, report.applied
    ));
    if !changed && !force {
        session.sendln("commit: refusing to save unchanged configuration - consider 'commit force'");
        return Ok(());
    }
    match &ctx.store {
        Some(store) => match store.save_new(&ctx.active.lines()) {
            Ok(path) => {
                session.sendln(&format!("commit: new configuration saved: [{}]", path.display()))
            }
            Err(err) => {
                warn!("Could not save configuration snapshot: {}", err);
                session.sendln(&format!("commit: could not save configuration: {}", err));
            }
        },
        None => debug!("No snapshot store, configuration not saved"),
    }
    session.sendln("commit: active configuration updated");
    Ok(())
}

fn cmd_configure(
    ctx: &mut Context,
    _node: &CommandNode,
    _line: &str,
    session: &mut dyn Session,
) -> Result<(), DispatchError> {
    if session.privilege() < Privilege::Config {
        session.set_privilege(Privilege::Config);
        report_uncommitted(ctx, session);
    }
    Ok(())
}

fn cmd_enable(
    _ctx: &mut Context,
    _node: &CommandNode,
    _line: &str,
    session: &mut dyn Session,
) -> Result<(), DispatchError> {
    if session.privilege() < Privilege::Enable {
        session.set_privilege(Privilege::Enable);
    }
    Ok(())
}

/// Leave one level of configuration mode, or drop one privilege level
fn cmd_exit(
    ctx: &mut Context,
    _node: &CommandNode,
    _line: &str,
    session: &mut dyn Session,
) -> Result<(), DispatchError> {
    if !session.edit_path().is_empty() {
        let parent = split_last_token(session.edit_path()).0.to_string();
        session.set_edit_path(parent);
        return Ok(());
    }
    match session.privilege() {
        level if level <= Privilege::Exec => {
            session.sendln("use 'quit' to exit remote terminal");
        }
        Privilege::Config => {
            report_uncommitted(ctx, session);
            session.set_privilege(Privilege::Enable);
        }
        _ => session.set_privilege(Privilege::Exec),
    }
    Ok(())
}

fn cmd_quit(
    _ctx: &mut Context,
    _node: &CommandNode,
    _line: &str,
    session: &mut dyn Session,
) -> Result<(), DispatchError> {
    session.sendln("bye");
    session.quit();
    Ok(())
}

fn cmd_list(
    ctx: &mut Context,
    node: &CommandNode,
    _line: &str,
    session: &mut dyn Session,
) -> Result<(), DispatchError> {
    let handlers_only = node.label == "brief";
    let show_description = node.label == "description";
    let mut lines = Vec::new();
    ctx.tree().visit(&mut |cmd, depth| {
        if handlers_only && !cmd.is_leaf() {
            return;
        }
        let kind = if cmd.is_leaf() { "LEAF" } else { "----" };
        let level = cmd.min_level.to_string();
        let mut line = format!("{} {:<6} {}{}", kind, level, "  ".repeat(depth), cmd.path);
        if show_description {
            line.push_str(&format!(" [{}]", cmd.description));
        }
        lines.push(line);
    });
    for line in lines {
        session.sendln(&line);
    }
    Ok(())
}

/// Push back the active units whose removal `no` already applied
fn reapply_negated(ctx: &mut Context, session: &mut dyn Session) {
    if ctx.negated.is_empty() {
        return;
    }
    let active = ctx.active.units();
    let units: Vec<String> = std::mem::take(&mut ctx.negated)
        .into_iter()
        .rev()
        .filter(|unit| active.contains(unit))
        .collect();
    let tree = std::sync::Arc::clone(ctx.tree());
    let restored = commit::plan(&tree, &units, commit::Direction::Apply, false)
        .and_then(|actions| commit::execute(&actions));
    match restored {
        Ok(0) => (),
        Ok(count) => session.sendln(&format!(
            "rollback: re-applied {} unit(s) removed by 'no'",
            count
        )),
        Err(err) => {
            warn!("Could not re-apply negated configuration: {}", err);
            session.sendln(&format!(
                "rollback: warning: removals applied by 'no' were not restored: {}",
                err
            ));
        }
    }
}

fn cmd_rollback(
    ctx: &mut Context,
    node: &CommandNode,
    line: &str,
    session: &mut dyn Session,
) -> Result<(), DispatchError> {
    if node.token().is_literal() {
        if !ctx.is_changed() {
            session.sendln("rollback: notice: there is no uncommitted change to discard");
        }
        session.sendln("rollback: restoring candidate configuration from active configuration");
        reapply_negated(ctx, session);
        ctx.candidate_from_active();
        return Ok(());
    }

    if ctx.is_changed() {
        session.sendln("rollback: refusing to load rollback config over uncommitted changes");
        return Ok(());
    }
    reapply_negated(ctx, session);
    let store = ctx
        .store
        .clone()
        .ok_or_else(|| DispatchError::Failed("rollback: no configuration store".to_string()))?;
    let id = last_token(line);
    let path = store.path_for(id);
    if !path.is_file() {
        return Err(DispatchError::Failed(format!(
            "rollback: commit '{}' not found: [{}]",
            id,
            path.display()
        )));
    }

    let previous = std::mem::take(&mut ctx.candidate);
    let mut loader = CaptureSession::new(Privilege::Config);
    let report = match store::load(ctx, &path, &mut loader, false) {
        Ok(report) => report,
        Err(err) => {
            ctx.candidate = previous;
            return Err(err.into());
        }
    };
    if report.bad > 0 {
        session.sendln(&format!(
            "rollback: CAUTION: {} line(s) from [{}] failed to load",
            report.bad,
            path.display()
        ));
    }
    session.sendln(&format!(
        "rollback: commit '{}' loaded from [{}] as candidate config",
        id,
        path.display()
    ));
    if !ctx.is_changed() {
        session.sendln(&format!(
            "rollback: notice: loaded commit '{}' is identical to active configuration",
            id
        ));
    }
    session.sendln("rollback: use 'show configuration compare' to verify candidate changes");
    session.sendln("rollback: use 'commit' to apply candidate changes");
    session.sendln("rollback: use 'rollback' to discard candidate changes");
    Ok(())
}

fn show_config(root: &ConfNode, node: &CommandNode, session: &mut dyn Session) {
    let lines = if node.label == "tree" {
        root.tree_lines()
    } else {
        root.lines()
    };
    for line in lines {
        session.sendln(&line);
    }
}

fn cmd_show_compare(
    ctx: &mut Context,
    _node: &CommandNode,
    _line: &str,
    session: &mut dyn Session,
) -> Result<(), DispatchError> {
    session.sendln("difference from active to candidate:");
    for line in commit::diff(&ctx.active, &ctx.candidate).lines() {
        session.sendln(&line);
    }
    Ok(())
}

fn cmd_show_rollback(
    ctx: &mut Context,
    node: &CommandNode,
    line: &str,
    session: &mut dyn Session,
) -> Result<(), DispatchError> {
    let store = match &ctx.store {
        Some(store) => store,
        None => {
            session.sendln("no configuration store");
            return Ok(());
        }
    };
    if let Token::Placeholder(_) = node.token() {
        let id = last_token(line);
        let path = store.path_for(id);
        session.sendln(&format!("configuration file for commit id '{}':", id));
        let lines = read_lines(&path)?;
        for line in &lines {
            session.sendln(line);
        }
        session.sendln(&format!("(found {} lines)", lines.len()));
        return Ok(());
    }
    let snapshots = store.list()?;
    session.sendln(&format!("found {} configuration files:", snapshots.len()));
    for (_, path) in snapshots {
        session.sendln(&path.display().to_string());
    }
    Ok(())
}

fn cmd_show_history(
    _ctx: &mut Context,
    _node: &CommandNode,
    _line: &str,
    session: &mut dyn Session,
) -> Result<(), DispatchError> {
    let lines = {
        let mut table = OutputTable::new();
        for entry in session.history().iter().enumerate() {
            table.add_row(&entry);
        }
        table.lines()
    };
    session.sendln("command history:");
    for line in lines {
        session.sendln(&line);
    }
    Ok(())
}

fn cmd_show_version(
    ctx: &mut Context,
    _node: &CommandNode,
    _line: &str,
    session: &mut dyn Session,
) -> Result<(), DispatchError> {
    session.sendln(&format!(
        "routerd {} daemon, version {}",
        ctx.daemon,
        env!("CARGO_PKG_VERSION")
    ));
    Ok(())
}

/// Tree with the common commands, `hostname` and a few configuration paths
#[cfg(test)]
pub(crate) fn test_tree() -> std::sync::Arc<CommandTree> {
    use crate::command::{KeywordRegistry, Lister};
    use std::sync::Arc;

    let lister: Lister = Arc::new(|| {
        let names = vec!["eth0".to_string(), "eth1".to_string()];
        (names, vec![String::new(); 2])
    });
    let mut tree = CommandTree::new(KeywordRegistry::new(lister));
    install_common(&mut tree).unwrap();
    install_hostname(&mut tree).unwrap();
    for path in &[
        "interface {IFNAME} description {ANY}",
        "interface {IFNAME} shutdown",
    ] {
        tree.install(
            CommandKind::Config,
            path,
            Privilege::Config,
            config_handler(),
            Some(noop_apply()),
            "",
        )
        .unwrap();
    }
    Arc::new(tree)
}
