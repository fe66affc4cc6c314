//! Removal of ignored fields by JSON pointer or JQ path expression.

use globset::{GlobBuilder, GlobMatcher};
use json_patch::{PatchOperation, RemoveOperation};
use jsonptr::PointerBuf;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use super::Normalizer;
use crate::error::{Error, Result};
use crate::object::Unstructured;
use crate::settings::{parse_override_key, IgnoreNormalizerOpts, ResourceIgnoreDifferences, ResourceOverride};

type Json = serde_json::Value;

/// Matches resources by group and kind globs plus exact name and namespace.
/// Empty name or namespace matches any.
#[derive(Debug, Clone)]
pub struct ResourceMatcher {
    group: GlobMatcher,
    kind: GlobMatcher,
    name: String,
    namespace: String,
}

fn compile_glob(pattern: &str) -> Result<GlobMatcher> {
    GlobBuilder::new(pattern)
        .literal_separator(false)
        .build()
        .map(|g| g.compile_matcher())
        .map_err(|e| Error::Glob {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })
}

impl ResourceMatcher {
    pub fn new(group: &str, kind: &str, name: &str, namespace: &str) -> Result<Self> {
        Ok(ResourceMatcher {
            group: compile_glob(group)?,
            kind: compile_glob(kind)?,
            name: name.to_string(),
            namespace: namespace.to_string(),
        })
    }

    pub fn from_rule(rule: &ResourceIgnoreDifferences) -> Result<Self> {
        Self::new(&rule.group, &rule.kind, &rule.name, &rule.namespace)
    }

    pub fn matches(&self, group: &str, kind: &str, name: &str, namespace: &str) -> bool {
        self.group.is_match(group)
            && self.kind.is_match(kind)
            && (self.name.is_empty() || self.name == name)
            && (self.namespace.is_empty() || self.namespace == namespace)
    }

    pub fn matches_object(&self, un: &Unstructured) -> bool {
        self.matches(un.group(), un.kind(), un.name(), un.namespace())
    }
}

/// A `del(...)` program built from a JQ path expression.
#[derive(Debug, Clone)]
struct JqProgram {
    expression: String,
    worker: Arc<JqWorker>,
}

impl JqProgram {
    fn compile(expression: &str) -> Result<Self> {
        let query = format!("del({})", expression);
        let worker = JqWorker::for_query(&query).map_err(|message| Error::Jq {
            expression: expression.to_string(),
            message,
        })?;
        Ok(JqProgram {
            expression: expression.to_string(),
            worker,
        })
    }

    /// Runs the program on its worker. A zero timeout waits without limit.
    fn apply(&self, doc: &Json, timeout: Duration) -> std::result::Result<Json, String> {
        self.worker.run(doc.clone(), timeout)
    }
}

type JqJob = (Json, mpsc::Sender<std::result::Result<Json, String>>);

/// Workers by query, shared by every normalizer in the process.
static JQ_WORKERS: Lazy<Mutex<HashMap<String, Arc<JqWorker>>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// A thread owning one compiled JQ filter and running its jobs in order.
///
/// Once a job outlives its timeout the thread is left to finish on its own
/// and the worker refuses further jobs, so each query holds at most one
/// runaway thread.
#[derive(Debug)]
struct JqWorker {
    query: String,
    jobs: Mutex<mpsc::Sender<JqJob>>,
    stuck: AtomicBool,
}

impl JqWorker {
    fn for_query(query: &str) -> std::result::Result<Arc<JqWorker>, String> {
        let mut workers = JQ_WORKERS.lock().map_err(|_| "JQ worker registry poisoned".to_string())?;
        if let Some(worker) = workers.get(query) {
            return Ok(Arc::clone(worker));
        }
        let worker = Arc::new(Self::spawn(query)?);
        workers.insert(query.to_string(), Arc::clone(&worker));
        Ok(worker)
    }

    fn spawn(query: &str) -> std::result::Result<JqWorker, String> {
        let (jobs_tx, jobs_rx) = mpsc::channel::<JqJob>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let owned_query = query.to_string();
        thread::Builder::new()
            .name("jq-patch".to_string())
            .spawn(move || {
                let filter = match compile_filter(&owned_query) {
                    Ok(filter) => {
                        let _ = ready_tx.send(Ok(()));
                        filter
                    }
                    Err(message) => {
                        let _ = ready_tx.send(Err(message));
                        return;
                    }
                };
                for (input, reply) in jobs_rx {
                    let _ = reply.send(run_filter(&filter, input));
                }
            })
            .map_err(|e| format!("failed to start JQ patch execution: {}", e))?;

        ready_rx
            .recv()
            .map_err(|_| "JQ compilation aborted".to_string())??;
        Ok(JqWorker {
            query: query.to_string(),
            jobs: Mutex::new(jobs_tx),
            stuck: AtomicBool::new(false),
        })
    }

    fn run(&self, input: Json, timeout: Duration) -> std::result::Result<Json, String> {
        if self.stuck.load(Ordering::Acquire) {
            warn!(query = self.query.as_str(), "skipping JQ patch that timed out earlier");
            return Err("JQ patch disabled after an earlier timeout".to_string());
        }

        let (tx, rx) = mpsc::channel();
        let sent = self
            .jobs
            .lock()
            .map_err(|_| "JQ worker poisoned".to_string())?
            .send((input, tx));
        if sent.is_err() {
            self.forget();
            return Err("JQ patch execution aborted".to_string());
        }

        let received = if timeout.is_zero() {
            rx.recv().map_err(|_| RecvTimeoutError::Disconnected)
        } else {
            rx.recv_timeout(timeout)
        };
        match received {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                self.stuck.store(true, Ordering::Release);
                warn!(query = self.query.as_str(), ?timeout, "JQ patch timed out, disabling it");
                Err(format!("JQ patch execution timed out ({:?})", timeout))
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.forget();
                Err("JQ patch execution aborted".to_string())
            }
        }
    }

    /// Drops a dead worker from the registry so the next build respawns it.
    fn forget(&self) {
        if let Ok(mut workers) = JQ_WORKERS.lock() {
            if workers.get(&self.query).is_some_and(|w| std::ptr::eq(w.as_ref(), self)) {
                workers.remove(&self.query);
            }
        }
    }
}

fn compile_filter(query: &str) -> std::result::Result<jaq_interpret::Filter, String> {
    let mut defs = jaq_interpret::ParseCtx::new(Vec::new());
    defs.insert_natives(jaq_core::core());
    defs.insert_defs(jaq_std::std());

    let (main, errs) = jaq_parse::parse(query, jaq_parse::main());
    if !errs.is_empty() {
        let messages: Vec<String> = errs.iter().map(ToString::to_string).collect();
        return Err(messages.join("; "));
    }
    let main = main.ok_or_else(|| "empty program".to_string())?;
    let filter = defs.compile(main);
    if !defs.errs.is_empty() {
        return Err(format!("{} undefined symbol(s)", defs.errs.len()));
    }
    Ok(filter)
}

fn run_filter(filter: &jaq_interpret::Filter, input: Json) -> std::result::Result<Json, String> {
    use jaq_interpret::{Ctx, FilterT, RcIter, Val};

    let inputs = RcIter::new(core::iter::empty());
    let mut out = filter.run((Ctx::new([], &inputs), Val::from(input)));

    let first = match out.next() {
        None => return Err("JQ patch did not return any data".to_string()),
        Some(Err(e)) => return Err(format!("JQ patch returned error: {}", e)),
        Some(Ok(v)) => v,
    };
    if out.next().is_some() {
        return Err("JQ patch returned multiple objects".to_string());
    }
    Ok(Json::from(first))
}

#[derive(Debug, Clone)]
enum PatchOp {
    Pointer { pointer: String, ops: Vec<PatchOperation> },
    Jq(JqProgram),
}

#[derive(Debug, Clone)]
struct IgnorePatch {
    matcher: ResourceMatcher,
    op: PatchOp,
}

impl IgnorePatch {
    fn apply(&self, doc: &mut Json, timeout: Duration) -> std::result::Result<(), String> {
        match &self.op {
            PatchOp::Pointer { ops, .. } => json_patch::patch(doc, ops).map_err(|e| e.to_string()),
            PatchOp::Jq(program) => {
                *doc = program.apply(doc, timeout)?;
                Ok(())
            }
        }
    }
}

impl fmt::Display for IgnorePatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.op {
            PatchOp::Pointer { pointer, .. } => write!(f, "jsonPointer {}", pointer),
            PatchOp::Jq(program) => write!(f, "jqPathExpression {}", program.expression),
        }
    }
}

/// Strips ignored fields from matching objects.
#[derive(Debug, Clone)]
pub struct IgnoreNormalizer {
    patches: Vec<IgnorePatch>,
    opts: IgnoreNormalizerOpts,
}

impl IgnoreNormalizer {
    /// Compiles the rules and the ignore fields of every override. Override
    /// keys become group/kind patterns.
    pub fn new(
        ignores: &[ResourceIgnoreDifferences],
        overrides: &HashMap<String, ResourceOverride>,
        opts: IgnoreNormalizerOpts,
    ) -> Result<Self> {
        let mut rules: Vec<ResourceIgnoreDifferences> = ignores.to_vec();

        let mut keys: Vec<&String> = overrides.keys().collect();
        keys.sort();
        for key in keys {
            let diff = &overrides[key].ignore_differences;
            if diff.json_pointers.is_empty() && diff.jq_path_expressions.is_empty() {
                continue;
            }
            let (group, kind) = match parse_override_key(key) {
                Ok(gk) => gk,
                Err(e) => {
                    warn!(error = %e, "skipping resource override");
                    continue;
                }
            };
            rules.push(ResourceIgnoreDifferences {
                group,
                kind,
                json_pointers: diff.json_pointers.clone(),
                jq_path_expressions: diff.jq_path_expressions.clone(),
                ..Default::default()
            });
        }

        let mut patches = Vec::new();
        for rule in &rules {
            let matcher = ResourceMatcher::from_rule(rule)?;
            for pointer in &rule.json_pointers {
                let path = PointerBuf::parse(pointer.as_str()).map_err(|e| Error::Pointer {
                    pointer: pointer.clone(),
                    message: e.to_string(),
                })?;
                patches.push(IgnorePatch {
                    matcher: matcher.clone(),
                    op: PatchOp::Pointer {
                        pointer: pointer.clone(),
                        ops: vec![PatchOperation::Remove(RemoveOperation { path })],
                    },
                });
            }
            for expression in &rule.jq_path_expressions {
                patches.push(IgnorePatch {
                    matcher: matcher.clone(),
                    op: PatchOp::Jq(JqProgram::compile(expression)?),
                });
            }
        }

        Ok(IgnoreNormalizer { patches, opts })
    }

    /// Number of compiled patches.
    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }
}

impl Normalizer for IgnoreNormalizer {
    fn normalize(&self, un: &mut Unstructured) -> Result<()> {
        let matched: Vec<&IgnorePatch> = self
            .patches
            .iter()
            .filter(|p| p.matcher.matches_object(un))
            .collect();
        if matched.is_empty() {
            return Ok(());
        }

        let mut doc = un.to_json();
        for patch in matched {
            if let Err(message) = patch.apply(&mut doc, self.opts.jq_execution_timeout) {
                debug!(
                    patch = %patch,
                    resource = %un,
                    error = message.as_str(),
                    "failed to apply normalization"
                );
            }
        }
        *un = Unstructured::from_json(doc)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_programs_share_one_worker_per_query() {
        let first = JqProgram::compile(".spec.paused").unwrap();
        let second = JqProgram::compile(".spec.paused").unwrap();
        let other = JqProgram::compile(".spec.minReadySeconds").unwrap();
        assert!(Arc::ptr_eq(&first.worker, &second.worker));
        assert!(!Arc::ptr_eq(&first.worker, &other.worker));

        let doc = json!({"spec": {"paused": true, "replicas": 2}});
        let out = second.apply(&doc, Duration::from_secs(5)).unwrap();
        assert_eq!(out, json!({"spec": {"replicas": 2}}));
    }

    #[test]
    fn test_comma_paths_delete_in_one_pass() {
        let program = JqProgram::compile(".spec.paused, .status").unwrap();
        let out = program
            .apply(&json!({"spec": {"paused": true}, "status": {}}), Duration::ZERO)
            .unwrap();
        assert_eq!(out, json!({"spec": {}}));
    }
}
