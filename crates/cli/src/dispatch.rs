//! Command dispatcher
//!
//! One input line at a time: split with shell-like quoting, match the verb,
//! resolve the path argument through the router, refuse remote verbs on
//! unauthenticated backends, invoke the operation, render the result.
//! Unknown verbs forward to the resolved adapter's passthrough.

use std::path::Path;
use std::sync::Arc;

use ps_core::{
    Backend, Error, ItemOp, ItemResult, LifecycleAction, LifecycleRuleSpec, PutOutcome, Result,
    SessionManager, TransferEngine, TransferItem, TransferPlan, VPath, noop_progress,
    plan_local_uploads,
};

use crate::exit_code::ExitCode;
use crate::factory::AdapterFactory;
use crate::local::{LocalCwd, expand_local_sources};
use crate::output::Printer;
use crate::output::progress::TransferRenderer;

/// What the loop should do after a dispatched line
#[derive(Debug, PartialEq, Eq)]
pub enum LoopSignal {
    /// Keep reading input
    Continue(ExitCode),
    /// Leave the loop
    Quit,
}

/// Split an input line into words with shell-like quoting.
///
/// Double and single quotes group words; a backslash escapes the next
/// character outside single quotes.
pub fn split_line(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut has_word = false;
    let mut chars = line.chars().peekable();
    let mut quote: Option<char> = None;

    while let Some(c) = chars.next() {
        match quote {
            Some('\'') => {
                if c == '\'' {
                    quote = None;
                } else {
                    current.push(c);
                }
            }
            Some(_) => {
                if c == '"' {
                    quote = None;
                } else if c == '\\' {
                    if let Some(next) = chars.next() {
                        current.push(next);
                    }
                } else {
                    current.push(c);
                }
            }
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    has_word = true;
                }
                '\\' => {
                    if let Some(next) = chars.next() {
                        current.push(next);
                        has_word = true;
                    }
                }
                c if c.is_whitespace() => {
                    if has_word {
                        words.push(std::mem::take(&mut current));
                        has_word = false;
                    }
                }
                c => {
                    current.push(c);
                    has_word = true;
                }
            },
        }
    }
    if has_word {
        words.push(current);
    }
    words
}

fn usage(message: &str) -> Error {
    Error::InvalidPath(message.to_string())
}

/// Parse `lifecycle` verb arguments into an action
pub fn parse_lifecycle(args: &[String]) -> Result<LifecycleAction> {
    if args.is_empty() || args[0] == "show" {
        return Ok(LifecycleAction::Show);
    }
    if args[0] == "versioning" {
        return match args.get(1).map(String::as_str) {
            Some("on") => Ok(LifecycleAction::Versioning(true)),
            Some("off") => Ok(LifecycleAction::Versioning(false)),
            _ => Err(usage("lifecycle <path> versioning on|off")),
        };
    }

    let mut abort_multipart = None;
    let mut expire_noncurrent = None;
    let mut i = 0;
    while i < args.len() {
        let rule = args[i].as_str();
        let days: u32 = args
            .get(i + 1)
            .and_then(|d| d.parse().ok())
            .ok_or_else(|| usage("lifecycle rule needs a day count"))?;
        let enabled = match args.get(i + 2).map(String::as_str) {
            Some("on") => true,
            Some("off") => false,
            _ => return Err(usage("lifecycle rule needs on|off")),
        };
        let spec = LifecycleRuleSpec { days, enabled };
        match rule {
            "abort-multipart" => abort_multipart = Some(spec),
            "expire-noncurrent" => expire_noncurrent = Some(spec),
            other => return Err(usage(&format!("unknown lifecycle rule '{other}'"))),
        }
        i += 3;
    }
    Ok(LifecycleAction::Set {
        abort_multipart,
        expire_noncurrent,
    })
}

fn get_op(backend: Arc<dyn Backend>) -> ItemOp {
    Arc::new(move |item: TransferItem| {
        let backend = Arc::clone(&backend);
        Box::pin(async move {
            let bytes = backend.get(&item, noop_progress()).await?;
            Ok(ItemResult::Transferred(bytes))
        })
    })
}

fn put_op(backend: Arc<dyn Backend>) -> ItemOp {
    Arc::new(move |item: TransferItem| {
        let backend = Arc::clone(&backend);
        Box::pin(async move {
            let remote = VPath::new(&item.dest)?;
            match backend
                .put(&remote, Path::new(&item.source), noop_progress())
                .await?
            {
                PutOutcome::Stored(bytes) => Ok(ItemResult::Transferred(bytes)),
                PutOutcome::Skipped => Ok(ItemResult::Skipped),
            }
        })
    })
}

fn empty_report() -> ps_core::TransferReport {
    ps_core::TransferReport {
        files_done: 0,
        files_skipped: 0,
        bytes_done: 0,
        elapsed: std::time::Duration::ZERO,
        failures: Vec::new(),
        cancelled: false,
    }
}

fn confirm_prompt(prompt: &str) -> bool {
    let term = console::Term::stderr();
    if term.write_str(&format!("{prompt} [y/N] ")).is_err() {
        return false;
    }
    match term.read_line() {
        Ok(line) => matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
        Err(_) => false,
    }
}

/// The command dispatcher: owns the router, session, engine, and local cwd
pub struct Dispatcher {
    router: ps_core::MountTable,
    session: SessionManager,
    engine: TransferEngine,
    factory: AdapterFactory,
    local: LocalCwd,
    printer: Printer,
    assume_yes: bool,
    debug: bool,
}

impl Dispatcher {
    /// Build a dispatcher around an already-populated mount table
    pub fn new(
        router: ps_core::MountTable,
        session: SessionManager,
        printer: Printer,
        workers: usize,
        assume_yes: bool,
        debug: bool,
    ) -> Result<Self> {
        Ok(Self {
            router,
            session,
            engine: TransferEngine::new(workers),
            factory: AdapterFactory,
            local: LocalCwd::new()?,
            printer,
            assume_yes,
            debug,
        })
    }

    /// Prompt string for the interactive loop
    pub fn prompt(&self) -> String {
        format!("pshell:{}> ", self.router.cwd())
    }

    /// Dispatch one input line
    pub async fn dispatch(&mut self, line: &str) -> LoopSignal {
        let words = split_line(line);
        let Some(verb) = words.first().map(String::as_str) else {
            return LoopSignal::Continue(ExitCode::Success);
        };
        if verb == "quit" || verb == "exit" {
            return LoopSignal::Quit;
        }

        let args = &words[1..];
        match self.run_verb(verb, args, line).await {
            Ok(()) => LoopSignal::Continue(ExitCode::Success),
            Err(e) => {
                self.render_error(&e);
                LoopSignal::Continue(ExitCode::from(&e))
            }
        }
    }

    fn render_error(&self, e: &Error) {
        // raw protocol detail only surfaces in debug mode
        let message = match (e, self.debug) {
            (Error::Protocol(_), false) => {
                "Protocol error: malformed server response (--debug for detail)".to_string()
            }
            _ => e.to_string(),
        };
        self.printer.error(&message);
        tracing::debug!(error = %e, "command failed");
    }

    fn confirm(&self) -> Box<dyn Fn(&str) -> bool + Send + Sync> {
        if self.assume_yes {
            Box::new(|_prompt: &str| true)
        } else {
            Box::new(confirm_prompt)
        }
    }

    /// Resolve a path argument to its mount prefix and backend
    fn mount_at(&self, raw: &str) -> Result<(String, Arc<dyn Backend>)> {
        let path = VPath::resolve(self.router.cwd(), raw)?;
        let mount = self.router.mount_for(&path)?;
        let prefix = if mount.prefix.is_empty() {
            "/".to_string()
        } else {
            mount.prefix.clone()
        };
        Ok((prefix, Arc::clone(&mount.backend)))
    }

    /// Resolve and enforce authentication for a remote verb
    async fn authorized(&self, raw: &str) -> Result<(Arc<dyn Backend>, VPath)> {
        let (backend, path) = self.router.resolve(raw)?;
        if !backend.authenticated().await {
            return Err(Error::Auth(format!(
                "backend for {path} is not authenticated; run login"
            )));
        }
        Ok((backend, path))
    }

    async fn run_verb(&mut self, verb: &str, args: &[String], line: &str) -> Result<()> {
        match verb {
            "pwd" => {
                self.printer.line(self.router.cwd().as_str());
                Ok(())
            }
            "lpwd" => {
                self.printer.line(&self.local.path().display().to_string());
                Ok(())
            }
            "lcd" => {
                let raw = args.first().ok_or_else(|| usage("lcd <dir>"))?;
                let path = self.local.cd(raw)?.display().to_string();
                self.printer.line(&path);
                Ok(())
            }
            "lls" => {
                for line in self.local.ls(args.first().map(String::as_str))? {
                    self.printer.line(&line);
                }
                Ok(())
            }
            "cd" => {
                let raw = args.first().map(String::as_str).unwrap_or("/");
                self.authorized(raw).await?;
                let cwd = self.router.cd(raw).await?;
                self.printer.line(cwd.as_str());
                Ok(())
            }
            "ls" => self.cmd_ls(args).await,
            "file" => self.cmd_file(args).await,
            "mkdir" => {
                let raw = args.first().ok_or_else(|| usage("mkdir <path>"))?;
                let (backend, path) = self.authorized(raw).await?;
                backend.mkdir(&path).await?;
                self.printer.ok(&format!("created {path}"));
                Ok(())
            }
            "rmdir" => {
                let raw = args.first().ok_or_else(|| usage("rmdir <path>"))?;
                let (backend, path) = self.authorized(raw).await?;
                let confirm = self.confirm();
                backend.rmdir(&path, &*confirm).await?;
                self.printer.ok(&format!("removed {path}"));
                Ok(())
            }
            "rm" => {
                let raw = args.first().ok_or_else(|| usage("rm <path|pattern>"))?;
                let (backend, path) = self.authorized(raw).await?;
                let confirm = self.confirm();
                let count = backend.rm(&path, &*confirm).await?;
                self.printer.ok(&format!("removed {count} object(s)"));
                Ok(())
            }
            "get" => self.cmd_get(args).await,
            "put" => self.cmd_put(args).await,
            "copy" => self.cmd_copy(args).await,
            "publish" => {
                let raw = args.first().ok_or_else(|| usage("publish <path|pattern>"))?;
                let (backend, path) = self.authorized(raw).await?;
                for line in backend.publish(&path).await? {
                    self.printer.line(&line);
                }
                Ok(())
            }
            "unpublish" => {
                let raw = args.first().ok_or_else(|| usage("unpublish <path>"))?;
                let (backend, path) = self.authorized(raw).await?;
                let removed = backend.unpublish(&path).await?;
                self.printer.ok(&format!("removed {removed} grant(s)"));
                Ok(())
            }
            "lifecycle" => {
                let raw = args.first().ok_or_else(|| usage("lifecycle <path> ..."))?;
                let (backend, path) = self.authorized(raw).await?;
                let action = parse_lifecycle(&args[1..])?;
                for line in backend.lifecycle(&path, &action).await? {
                    self.printer.line(&line);
                }
                Ok(())
            }
            "login" => self.cmd_login(args).await,
            "logout" => {
                let raw = args.first().map(String::as_str).unwrap_or(".");
                let (prefix, backend) = self.mount_at(raw)?;
                backend.logout().await?;
                self.session.persist_backend(&prefix, &backend).await?;
                self.printer.ok(&format!("logged out of {prefix}"));
                Ok(())
            }
            "delegate" => self.cmd_delegate(args).await,
            "whoami" => {
                let (backend, _) = self.authorized(".").await?;
                let actor = backend.identity().await?;
                self.printer.line(&actor);
                Ok(())
            }
            "processes" => self.cmd_processes(args),
            "remotes" => self.cmd_remotes().await,
            _ => {
                // passthrough to the adapter owning the cwd
                let (backend, _) = self.authorized(".").await?;
                let output = backend.command(line).await?;
                self.printer.line(&output);
                Ok(())
            }
        }
    }

    async fn cmd_ls(&self, args: &[String]) -> Result<()> {
        use futures::StreamExt;
        let raw = args.first().map(String::as_str).unwrap_or(".");
        let (backend, path) = self.authorized(raw).await?;
        let mut lines = backend.ls(&path).await?;
        while let Some(line) = lines.next().await {
            self.printer.line(&line?);
        }
        Ok(())
    }

    async fn cmd_file(&self, args: &[String]) -> Result<()> {
        use futures::StreamExt;
        let raw = args.first().ok_or_else(|| usage("file <path>"))?;
        let (backend, path) = self.authorized(raw).await?;
        let mut rows = backend.info(&path).await?;
        while let Some(row) = rows.next().await {
            let (key, value) = row?;
            self.printer.row(&key, &value);
        }
        Ok(())
    }

    async fn cmd_get(&self, args: &[String]) -> Result<()> {
        let raw = args.first().ok_or_else(|| usage("get <path|pattern> [local-dir]"))?;
        let local_dir = match args.get(1) {
            Some(dir) => self.local.resolve(dir),
            None => self.local.path().to_path_buf(),
        };
        let (backend, path) = self.authorized(raw).await?;
        let plan = backend.get_plan(&path, &local_dir).await?;
        self.run_transfer(plan, get_op(backend)).await
    }

    async fn cmd_put(&self, args: &[String]) -> Result<()> {
        let remote_raw = args.first().ok_or_else(|| usage("put <remote-dir> <local>"))?;
        let local_raw = args.get(1).ok_or_else(|| usage("put <remote-dir> <local>"))?;
        let (backend, remote) = self.authorized(remote_raw).await?;

        let sources = expand_local_sources(&self.local, local_raw)?;
        let plan = if sources.len() == 1 {
            plan_local_uploads(&sources[0], &remote)?
        } else {
            let mut items = Vec::with_capacity(sources.len());
            for source in sources {
                let size = std::fs::metadata(&source)?.len();
                items.push(TransferItem {
                    source: source.to_string_lossy().into_owned(),
                    dest: remote.as_str().to_string(),
                    expected_bytes: Some(size),
                    handle: None,
                });
            }
            TransferPlan::from_items(items)
        };
        self.run_transfer(plan, put_op(backend)).await
    }

    async fn cmd_copy(&self, args: &[String]) -> Result<()> {
        let src_raw = args.first().ok_or_else(|| usage("copy <src> <dst>"))?;
        let dst_raw = args.get(1).ok_or_else(|| usage("copy <src> <dst>"))?;
        let (src_backend, src) = self.authorized(src_raw).await?;
        let (dst_backend, dst) = self.router.resolve(dst_raw)?;

        let confirm = self.confirm();
        if Arc::ptr_eq(&src_backend, &dst_backend) {
            src_backend.copy(&src, &dst, None, &*confirm).await?;
        } else if src_backend.kind() == dst_backend.kind() {
            src_backend
                .copy(&src, &dst, Some(dst_backend), &*confirm)
                .await?;
        } else {
            return Err(Error::Unsupported(
                "copy between different backend kinds; use get then put".into(),
            ));
        }
        self.printer.ok(&format!("copied {src} -> {dst}"));
        Ok(())
    }

    async fn run_transfer(&self, plan: TransferPlan, op: ItemOp) -> Result<()> {
        let renderer =
            TransferRenderer::start(self.engine.counters(), self.printer.progress_enabled());

        let engine = self.engine.clone();
        let mut run = tokio::spawn(async move { engine.run(plan, op).await });
        let outcome = loop {
            tokio::select! {
                res = &mut run => {
                    break res.map_err(|e| Error::General(format!("transfer task failed: {e}")));
                }
                _ = tokio::signal::ctrl_c() => {
                    self.printer.warn("interrupt: finishing in-flight files");
                    self.engine.request_cancel();
                }
            }
        };
        let report = match outcome {
            Ok(Ok(report)) => report,
            Ok(Err(e)) | Err(e) => {
                let _ = renderer.finish(&empty_report()).await;
                return Err(e);
            }
        };

        let summary = renderer.finish(&report).await;
        self.printer.line(&summary);
        for failure in &report.failures {
            self.printer
                .warn(&format!("{}: {} -> {}", failure.status, failure.source, failure.dest));
        }
        if report.cancelled {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    async fn cmd_login(&mut self, args: &[String]) -> Result<()> {
        let raw = args.first().map(String::as_str).unwrap_or(".");
        let (prefix, backend) = self.mount_at(raw)?;
        let term = console::Term::stderr();

        let credentials = match backend.kind() {
            ps_core::BackendKind::Asset => {
                term.write_str("domain: ").map_err(Error::from)?;
                let domain = term.read_line().map_err(Error::from)?;
                term.write_str("user: ").map_err(Error::from)?;
                let user = term.read_line().map_err(Error::from)?;
                term.write_str("password: ").map_err(Error::from)?;
                let password = term.read_secure_line().map_err(Error::from)?;
                ps_core::Credentials {
                    domain: (!domain.trim().is_empty()).then(|| domain.trim().to_string()),
                    user: Some(user.trim().to_string()),
                    password: Some(password),
                    token: None,
                }
            }
            ps_core::BackendKind::S3 => {
                term.write_str("access key: ").map_err(Error::from)?;
                let access = term.read_line().map_err(Error::from)?;
                term.write_str("secret key: ").map_err(Error::from)?;
                let secret = term.read_secure_line().map_err(Error::from)?;
                ps_core::Credentials {
                    domain: None,
                    user: Some(access.trim().to_string()),
                    password: Some(secret),
                    token: None,
                }
            }
        };

        backend.login(Some(credentials)).await?;
        self.session.persist_backend(&prefix, &backend).await?;
        self.printer.ok(&format!("logged in to {prefix}"));
        Ok(())
    }

    async fn cmd_delegate(&mut self, args: &[String]) -> Result<()> {
        if args.first().map(String::as_str) == Some("sso") {
            let source = args
                .get(1)
                .map(String::as_str)
                .ok_or_else(|| usage("delegate sso <source-mount> [target-root]"))?;
            let target_root = args.get(2).map(String::as_str).unwrap_or("/projects");
            let mounted = self
                .session
                .delegate_sso(&self.factory, &mut self.router, source, target_root)
                .await?;
            for prefix in &mounted {
                self.printer.ok(&format!("mounted {prefix}"));
            }
            return Ok(());
        }

        let lifetime = args
            .first()
            .ok_or_else(|| usage("delegate <days|off> [mount]"))?
            .parse::<ps_core::DelegateLifetime>()?;
        let raw = args.get(1).map(String::as_str).unwrap_or(".");
        let (prefix, backend) = self.mount_at(raw)?;
        if !backend.authenticated().await {
            return Err(Error::Auth(format!("{prefix} is not authenticated")));
        }

        match backend.delegate(lifetime).await? {
            Some(token) => self.printer.line(&token),
            None => self.printer.ok("delegated tokens destroyed"),
        }
        self.session.persist_backend(&prefix, &backend).await?;
        Ok(())
    }

    fn cmd_processes(&mut self, args: &[String]) -> Result<()> {
        if let Some(raw) = args.first() {
            let workers: usize = raw
                .parse()
                .map_err(|_| usage("processes [worker-count]"))?;
            if self.engine.busy() {
                return Err(Error::TransferBusy);
            }
            self.engine = TransferEngine::new(workers);
        }
        let state = if self.engine.busy() { "transferring" } else { "idle" };
        self.printer
            .line(&format!("{} worker(s), {state}", self.engine.workers()));
        Ok(())
    }

    async fn cmd_remotes(&self) -> Result<()> {
        let mut table = comfy_table::Table::new();
        table.set_header(vec!["Mount", "Kind", "Status"]);
        for row in self.router.list_status().await {
            table.add_row(vec![row.prefix, row.kind.to_string(), row.status]);
        }
        self.printer.line(&table.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_line_plain() {
        assert_eq!(split_line("ls /projects/foo"), vec!["ls", "/projects/foo"]);
        assert_eq!(split_line("  pwd  "), vec!["pwd"]);
        assert!(split_line("   ").is_empty());
    }

    #[test]
    fn test_split_line_quotes() {
        assert_eq!(
            split_line("cd \"/a dir/with spaces\""),
            vec!["cd", "/a dir/with spaces"]
        );
        assert_eq!(
            split_line("rm '/x/it''s here'"),
            vec!["rm", "/x/its here"]
        );
        assert_eq!(split_line("echo \"\""), vec!["echo", ""]);
    }

    #[test]
    fn test_split_line_escapes() {
        assert_eq!(split_line(r"cd /a\ dir"), vec!["cd", "/a dir"]);
        assert_eq!(split_line(r#"say "a \"quote\"""#), vec!["say", "a \"quote\""]);
    }

    #[test]
    fn test_split_line_preserves_query_text() {
        let words = split_line("asset.query :where \"namespace='/www' and name='x'\"");
        assert_eq!(words[0], "asset.query");
        assert_eq!(words[2], "namespace='/www' and name='x'");
    }

    #[test]
    fn test_parse_lifecycle_show() {
        assert!(matches!(parse_lifecycle(&[]), Ok(LifecycleAction::Show)));
        assert!(matches!(
            parse_lifecycle(&["show".into()]),
            Ok(LifecycleAction::Show)
        ));
    }

    #[test]
    fn test_parse_lifecycle_versioning() {
        assert!(matches!(
            parse_lifecycle(&["versioning".into(), "on".into()]),
            Ok(LifecycleAction::Versioning(true))
        ));
        assert!(matches!(
            parse_lifecycle(&["versioning".into(), "off".into()]),
            Ok(LifecycleAction::Versioning(false))
        ));
        assert!(parse_lifecycle(&["versioning".into()]).is_err());
    }

    #[test]
    fn test_parse_lifecycle_rules() {
        let action = parse_lifecycle(&[
            "abort-multipart".into(),
            "7".into(),
            "on".into(),
            "expire-noncurrent".into(),
            "30".into(),
            "off".into(),
        ])
        .unwrap();
        match action {
            LifecycleAction::Set {
                abort_multipart,
                expire_noncurrent,
            } => {
                let abort = abort_multipart.unwrap();
                assert_eq!(abort.days, 7);
                assert!(abort.enabled);
                let expire = expire_noncurrent.unwrap();
                assert_eq!(expire.days, 30);
                assert!(!expire.enabled);
            }
            other => panic!("expected Set, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_lifecycle_rejects_unknown_rule() {
        assert!(parse_lifecycle(&["shred".into(), "1".into(), "on".into()]).is_err());
    }
}
