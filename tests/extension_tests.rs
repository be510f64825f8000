//! Integration tests for the extension plugin lifecycle.
//!
//! A test plugin records every compile/validate/free invocation so the
//! lifecycle guarantees can be asserted end to end: compiled exactly once,
//! validated any number of times read-only, freed exactly once in reverse
//! compilation order.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use modelscript::prelude::*;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn module_stmt(name: &str) -> ParsedStmt {
    ParsedStmt::with_arg(StmtKind::Module, name)
        .child(ParsedStmt::with_arg(
            StmtKind::Namespace,
            format!("urn:example:{name}"),
        ))
        .child(ParsedStmt::with_arg(StmtKind::Prefix, name))
}

fn leaf(name: &str, type_name: &str) -> ParsedStmt {
    ParsedStmt::with_arg(StmtKind::Leaf, name)
        .child(ParsedStmt::with_arg(StmtKind::Type, type_name))
}

/// Compiled data the annotation plugin attaches to its instances.
#[derive(Debug, PartialEq)]
struct AnnotationData {
    note: Option<String>,
    descriptions: Vec<String>,
}

/// A plugin accepting an optional `argument` and any number of
/// `description` substatements, rejecting data nodes whose value is
/// `"invalid"`.
#[derive(Default)]
struct AnnotationPlugin {
    compiled: AtomicUsize,
    validated: AtomicUsize,
    freed: Mutex<Vec<String>>,
}

impl AnnotationPlugin {
    fn substmt_table() -> SubstmtTable {
        SubstmtTable::new(vec![
            SubstmtDescriptor::new(StmtKind::Argument, Cardinality::Opt),
            SubstmtDescriptor::new(StmtKind::Description, Cardinality::Any),
        ])
        .expect("annotation table")
    }
}

impl ExtensionPlugin for AnnotationPlugin {
    fn compile(
        &self,
        cctx: &mut dyn ExtCompileCtx,
        parsed: &ParsedExtInstance,
        compiled: &mut CompiledExtInstance,
    ) -> Result<(), CompileError> {
        let table = Self::substmt_table();
        let substmts = cctx.compile_substatements(&table, &parsed.children)?;
        let descriptions = substmts
            .many(StmtKind::Description)
            .iter()
            .filter_map(|s| s.arg.clone())
            .collect();
        compiled.set_data(AnnotationData {
            note: parsed.arg.clone(),
            descriptions,
        });
        compiled.set_substmts(substmts);
        self.compiled.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn validate(
        &self,
        ext: &CompiledExtInstance,
        node: &DataNode,
    ) -> Result<(), ValidationError> {
        self.validated.fetch_add(1, Ordering::SeqCst);
        if node.value.as_deref() == Some("invalid") {
            return Err(ValidationError::new(
                ext.qualified_name(),
                &node.name,
                "value rejected by annotation",
            ));
        }
        Ok(())
    }

    fn free(&self, ext: &mut CompiledExtInstance) {
        self.freed
            .lock()
            .unwrap()
            .push(ext.argument().unwrap_or("<none>").to_string());
    }
}

/// A plugin whose compile behavior always rejects its data.
struct RejectingPlugin;

impl ExtensionPlugin for RejectingPlugin {
    fn compile(
        &self,
        cctx: &mut dyn ExtCompileCtx,
        _parsed: &ParsedExtInstance,
        compiled: &mut CompiledExtInstance,
    ) -> Result<(), CompileError> {
        Err(CompileError::InvalidExtensionData {
            ext: compiled.qualified_name(),
            reason: "always rejected".to_string(),
            path: cctx.path(),
        })
    }
}

fn register_annotation(ctx: &mut Context) -> Arc<AnnotationPlugin> {
    let plugin = Arc::new(AnnotationPlugin::default());
    let descriptor = Arc::new(PluginDescriptor::new(
        "annotation",
        EXTENSION_API_VERSION,
        Arc::clone(&plugin) as Arc<dyn ExtensionPlugin>,
    ));
    ctx.register_extension("ext-defs", None, "note", descriptor)
        .unwrap();
    plugin
}

#[test]
fn extension_instance_compiles_through_its_table() {
    init_logging();
    let mut ctx = Context::new();
    let plugin = register_annotation(&mut ctx);

    // table = [{ARGUMENT, optional}, {DESCRIPTION, any}],
    // children = [DESCRIPTION "a", DESCRIPTION "b", ARGUMENT "x"]
    let parsed = module_stmt("m").child(
        leaf("hostname", "string").extension(
            ParsedExtInstance::new("ext-defs", "note")
                .with_arg("tagged")
                .child(ParsedStmt::with_arg(StmtKind::Description, "a"))
                .child(ParsedStmt::with_arg(StmtKind::Description, "b"))
                .child(ParsedStmt::with_arg(StmtKind::Argument, "x")),
        ),
    );

    let module = compile_module(&ctx, &parsed).unwrap();
    assert_eq!(plugin.compiled.load(Ordering::SeqCst), 1);

    let hostname = module.node("/hostname").unwrap();
    let instances: Vec<_> = module.node_extensions(hostname).collect();
    assert_eq!(instances.len(), 1);

    let instance = instances[0];
    assert_eq!(instance.state(), ExtState::Compiled);
    let data: &AnnotationData = instance.data().unwrap();
    assert_eq!(data.note.as_deref(), Some("tagged"));
    assert_eq!(data.descriptions, ["a", "b"]);
    let substmts = instance.substmts().unwrap();
    assert_eq!(substmts.first_arg(StmtKind::Argument), Some("x"));
}

#[test]
fn extension_with_illegal_child_fails_with_exact_path() {
    init_logging();
    let mut ctx = Context::new();
    register_annotation(&mut ctx);

    let parsed = module_stmt("m").child(
        leaf("hostname", "string").extension(
            ParsedExtInstance::new("ext-defs", "note")
                .child(ParsedStmt::with_arg(StmtKind::Units, "s")),
        ),
    );

    let err = compile_module(&ctx, &parsed).unwrap_err();
    assert_eq!(
        err,
        CompileError::UnsupportedStatement {
            stmt: StmtKind::Units,
            path: "/m/hostname/{extension='ext-defs:note'}".to_string(),
        }
    );
}

#[test]
fn unknown_extension_is_a_hard_error() {
    init_logging();
    let ctx = Context::new();
    let parsed = module_stmt("m")
        .child(leaf("x", "string").extension(ParsedExtInstance::new("ext-defs", "nope")));

    let err = compile_module(&ctx, &parsed).unwrap_err();
    assert!(matches!(
        err,
        CompileError::UnknownExtension { module, name, .. }
            if module == "ext-defs" && name == "nope"
    ));
}

#[test]
fn rejected_extension_data_aborts_the_module() {
    init_logging();
    let mut ctx = Context::new();
    let descriptor = Arc::new(PluginDescriptor::new(
        "rejecting",
        EXTENSION_API_VERSION,
        Arc::new(RejectingPlugin),
    ));
    ctx.register_extension("ext-defs", None, "reject", descriptor)
        .unwrap();

    let parsed = module_stmt("m")
        .child(leaf("x", "string").extension(ParsedExtInstance::new("ext-defs", "reject")));

    let err = compile_module(&ctx, &parsed).unwrap_err();
    assert!(matches!(err, CompileError::InvalidExtensionData { .. }));
}

#[test]
fn version_mismatch_rejected_before_any_use() {
    init_logging();
    let mut ctx = Context::new();
    let descriptor = Arc::new(PluginDescriptor::new(
        "stale",
        EXTENSION_API_VERSION + 1,
        Arc::new(AnnotationPlugin::default()) as Arc<dyn ExtensionPlugin>,
    ));

    let err = ctx
        .register_extension("ext-defs", None, "note", descriptor)
        .unwrap_err();
    assert_eq!(
        err,
        RegistrationError::VersionMismatch {
            plugin: "stale".to_string(),
            expected: EXTENSION_API_VERSION,
            found: EXTENSION_API_VERSION + 1,
        }
    );

    // The same plugin with a matching version registers fine.
    let descriptor = Arc::new(PluginDescriptor::new(
        "fresh",
        EXTENSION_API_VERSION,
        Arc::new(AnnotationPlugin::default()) as Arc<dyn ExtensionPlugin>,
    ));
    ctx.register_extension("ext-defs", None, "note", descriptor)
        .unwrap();
}

#[test]
fn exact_revision_plugin_wins_over_fallback() {
    init_logging();
    let mut ctx = Context::new();

    let fallback = Arc::new(AnnotationPlugin::default());
    let exact = Arc::new(AnnotationPlugin::default());
    for (revision, plugin) in [(None, &fallback), (Some("2026-01-01"), &exact)] {
        let descriptor = Arc::new(PluginDescriptor::new(
            "annotation",
            EXTENSION_API_VERSION,
            Arc::clone(plugin) as Arc<dyn ExtensionPlugin>,
        ));
        ctx.register_extension("defs", revision, "note", descriptor)
            .unwrap();
    }

    // The defining module "defs" is compiled with the matching revision.
    let defs = module_stmt("defs")
        .child(ParsedStmt::with_arg(StmtKind::Revision, "2026-01-01"))
        .child(
            ParsedStmt::with_arg(StmtKind::Extension, "note")
                .child(ParsedStmt::with_arg(StmtKind::Argument, "text")),
        );
    let defs = compile_module(&ctx, &defs).unwrap();
    ctx.insert_module(defs).unwrap();

    let app = module_stmt("app")
        .child(
            ParsedStmt::with_arg(StmtKind::Import, "defs")
                .child(ParsedStmt::with_arg(StmtKind::Prefix, "d")),
        )
        .child(leaf("x", "string").extension(ParsedExtInstance::new("defs", "note")));
    compile_module(&ctx, &app).unwrap();

    assert_eq!(exact.compiled.load(Ordering::SeqCst), 1);
    assert_eq!(fallback.compiled.load(Ordering::SeqCst), 0);
}

#[test]
fn validate_failures_are_local_to_the_data_instance() {
    init_logging();
    let mut ctx = Context::new();
    let plugin = register_annotation(&mut ctx);

    let parsed = module_stmt("m").child(
        leaf("status", "string").extension(ParsedExtInstance::new("ext-defs", "note")),
    );
    let module = compile_module(&ctx, &parsed).unwrap();
    ctx.insert_module(module).unwrap();

    let good = DataNode::leaf("status", "up");
    let bad = DataNode::leaf("status", "invalid");

    assert!(ctx.validate("m", "/status", &good).unwrap().is_empty());

    let errors = ctx.validate("m", "/status", &bad).unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].node, "status");

    // A failing data instance does not poison the schema or later data.
    assert!(ctx.validate("m", "/status", &good).unwrap().is_empty());
    assert_eq!(plugin.validated.load(Ordering::SeqCst), 3);
}

#[test]
fn instances_freed_exactly_once_in_reverse_compilation_order() {
    init_logging();
    let mut ctx = Context::new();
    let plugin = register_annotation(&mut ctx);

    let parsed = module_stmt("m")
        .child(
            leaf("first", "string")
                .extension(ParsedExtInstance::new("ext-defs", "note").with_arg("one")),
        )
        .child(
            leaf("second", "string")
                .extension(ParsedExtInstance::new("ext-defs", "note").with_arg("two")),
        );
    let module = compile_module(&ctx, &parsed).unwrap();
    assert_eq!(plugin.compiled.load(Ordering::SeqCst), 2);

    let module = ctx.insert_module(module).unwrap();
    // A few validate rounds; free must still run exactly once afterwards.
    let data = DataNode::leaf("first", "v");
    ctx.validate("m", "/first", &data).unwrap();
    ctx.validate("m", "/first", &data).unwrap();

    drop(module);
    assert!(plugin.freed.lock().unwrap().is_empty());
    ctx.remove_module("m");
    // Teardown happened when the last reference went away, later-compiled
    // instances first.
    assert_eq!(*plugin.freed.lock().unwrap(), ["two", "one"]);
}

#[test]
fn teardown_after_zero_validations_still_frees_once() {
    init_logging();
    let mut ctx = Context::new();
    let plugin = register_annotation(&mut ctx);

    let parsed = module_stmt("m")
        .child(leaf("x", "string").extension(ParsedExtInstance::new("ext-defs", "note")));
    let module = compile_module(&ctx, &parsed).unwrap();
    drop(module);

    assert_eq!(plugin.freed.lock().unwrap().len(), 1);
    assert_eq!(plugin.validated.load(Ordering::SeqCst), 0);
}

#[test]
fn module_level_extension_instances_compile() {
    init_logging();
    let mut ctx = Context::new();
    let plugin = register_annotation(&mut ctx);

    let parsed = module_stmt("m")
        .extension(ParsedExtInstance::new("ext-defs", "note").with_arg("module-wide"));
    let module = compile_module(&ctx, &parsed).unwrap();

    assert_eq!(plugin.compiled.load(Ordering::SeqCst), 1);
    assert_eq!(module.module_ext_ids.len(), 1);
    let instance = &module.extensions[module.module_ext_ids[0]];
    assert_eq!(instance.argument(), Some("module-wide"));
}
