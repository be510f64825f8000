//! Module compilation.
//!
//! Two passes over one module:
//!
//! 1. **Structural pass** - walk the parse tree top-down, validate every
//!    statement body against its substatement table, instantiate groupings
//!    (guarded against circular expansion), resolve typedef chains (guarded
//!    against circular bases), compile extension instances through their
//!    registered plugins, and record forward-dependent constructs (leafref
//!    targets, must/when expressions, incomplete defaults) as deferred
//!    obligations.
//! 2. **Resolution pass** - drain the deferred sets against the now
//!    complete structure. All resolution failures of one attempt are
//!    reported together.
//!
//! The output is an immutable [`CompiledModule`]; the compile context is
//! discarded.

use std::sync::Arc;

use log::{debug, trace};

use modelscript_core::compiled::{
    BuiltinType, CompiledExtInstance, CompiledModule, CompiledNode, CompiledType, CompiledTypedef,
    ExtensionDef, GroupingDef, NodeKind, Status,
};
use modelscript_core::error::{CompileError, DeferredKind};
use modelscript_core::parsed::{ParsedExtInstance, ParsedStmt};
use modelscript_core::stmt::StmtKind;
use modelscript_core::substmt::SubstmtTable;
use modelscript_registry::Context;

use crate::builtin::builtin_table;
use crate::context::{CompileCtx, CompileOptions, ScopedDef};
use crate::substmt::{check_cardinalities, compile_substatements};
use crate::unres::{Deferred, ResolutionPhase};

/// Compile a parsed module into its immutable compiled form.
pub fn compile_module(ctx: &Context, parsed: &ParsedStmt) -> Result<CompiledModule, CompileError> {
    compile_module_with_options(ctx, parsed, CompileOptions::empty())
}

/// Compile a parsed module with explicit strictness options.
pub fn compile_module_with_options<'p>(
    ctx: &'p Context,
    parsed: &'p ParsedStmt,
    options: CompileOptions,
) -> Result<CompiledModule, CompileError> {
    if parsed.kind != StmtKind::Module {
        return Err(CompileError::UnsupportedStatement {
            stmt: parsed.kind,
            path: "/".to_string(),
        });
    }
    let name = match parsed.arg.as_deref() {
        Some(arg) if !arg.is_empty() => arg,
        _ => {
            return Err(CompileError::InvalidArgument {
                stmt: StmtKind::Module,
                reason: "missing module name".to_string(),
                path: "/".to_string(),
            });
        }
    };
    debug!("compiling module {name}");

    let mut cctx = CompileCtx::new(ctx, name, options);
    cctx.path.push(None, name);
    cctx.push_scope();

    // Structural pass, registration sweep: metadata, imports, and the
    // typedefs/groupings that later references must be able to see.
    let table = builtin_table(StmtKind::Module).expect("module table");
    let mut counts = vec![0usize; table.len()];
    let mut namespace = None;
    let mut prefix = None;
    let mut description = None;
    let mut reference = None;
    let mut imports = Vec::new();
    let mut extension_defs = Vec::new();
    let mut module_typedefs: Vec<&'p ParsedStmt> = Vec::new();
    let mut module_groupings: Vec<&'p ParsedStmt> = Vec::new();
    let mut body: Vec<&'p ParsedStmt> = Vec::new();

    for child in &parsed.children {
        let Some(idx) = table.position(child.kind) else {
            return Err(CompileError::UnsupportedStatement {
                stmt: child.kind,
                path: cctx.path.render(),
            });
        };
        counts[idx] += 1;
        match child.kind {
            StmtKind::Namespace => namespace = child.arg.clone(),
            StmtKind::Prefix => prefix = child.arg.clone(),
            StmtKind::Import => imports.push(compile_import(&mut cctx, child)?),
            StmtKind::Revision => {
                // The first revision statement is the newest one.
                if cctx.revision.is_none() {
                    cctx.revision = child.arg.clone();
                }
                let revision_table = builtin_table(StmtKind::Revision).expect("revision table");
                compile_substatements(&mut cctx, revision_table, &child.children)?;
            }
            StmtKind::Extension => extension_defs.push(compile_extension_def(&mut cctx, child)?),
            StmtKind::Typedef => {
                let tname = require_arg(&cctx, child)?;
                let def = ScopedDef {
                    module: cctx.module.clone(),
                    name: tname,
                    stmt: child,
                };
                cctx.register_typedef(def)?;
                module_typedefs.push(child);
            }
            StmtKind::Grouping => {
                let gname = require_arg(&cctx, child)?;
                let def = ScopedDef {
                    module: cctx.module.clone(),
                    name: gname,
                    stmt: child,
                };
                cctx.register_grouping(def)?;
                module_groupings.push(child);
            }
            StmtKind::Uses => body.push(child),
            StmtKind::Description => description = child.arg.clone(),
            StmtKind::Reference => reference = child.arg.clone(),
            kind if kind.is_data_node() => body.push(child),
            _ => {}
        }
    }
    check_cardinalities(table, &counts, &cctx.path)?;

    let namespace = match namespace {
        Some(ns) if !ns.is_empty() => ns,
        _ => {
            return Err(CompileError::InvalidArgument {
                stmt: StmtKind::Namespace,
                reason: "missing argument".to_string(),
                path: cctx.path.render(),
            });
        }
    };
    let prefix = match prefix {
        Some(p) if !p.is_empty() => p,
        _ => {
            return Err(CompileError::InvalidArgument {
                stmt: StmtKind::Prefix,
                reason: "missing argument".to_string(),
                path: cctx.path.render(),
            });
        }
    };
    cctx.prefix = Some(prefix.clone());

    // Structural pass, compilation sweep.
    let mut typedefs = Vec::new();
    for &stmt in &module_typedefs {
        typedefs.push(compile_typedef(&mut cctx, stmt)?);
    }

    let mut nodes: Vec<CompiledNode> = Vec::new();
    for &stmt in &body {
        if stmt.kind == StmtKind::Uses {
            compile_uses(&mut cctx, stmt, &mut nodes)?;
        } else {
            let node = compile_node(&mut cctx, stmt)?;
            push_child(&cctx, &mut nodes, stmt.kind, node)?;
        }
    }

    let mut module_ext_ids = Vec::new();
    for ext in &parsed.extensions {
        module_ext_ids.push(compile_ext_instance(&mut cctx, ext)?);
    }

    // Groupings nobody instantiated still have to compile cleanly; do it
    // in isolation, without the resolution that only makes sense at a
    // point of use.
    for &stmt in &module_groupings {
        let gname = stmt.arg.as_deref().unwrap_or_default();
        let qualified = format!("{}:{gname}", cctx.module);
        if cctx.used_groupings.contains(&qualified) {
            continue;
        }
        trace!("validating unused grouping {qualified}");
        cctx.path.push_tag("grouping");
        cctx.path.push_tag_value(gname);
        let saved = cctx.options;
        cctx.options |= CompileOptions::GROUPING;
        let module = cctx.module.clone();
        let result = expand_grouping(&mut cctx, &qualified, module, stmt, &mut Vec::new());
        cctx.options = saved;
        cctx.path.pop();
        cctx.path.pop();
        result?;
    }

    debug_assert!(cctx.groupings.is_empty(), "grouping guard not unwound");
    debug_assert!(cctx.tpdf_chain.is_empty(), "typedef guard not unwound");

    // Resolution pass: drain both deferred sets, reporting every failure
    // of this attempt together.
    let mut unres = std::mem::take(&mut cctx.unres);
    let mut dflts = std::mem::take(&mut cctx.dflts);
    trace!(
        "draining {} deferred references, {} deferred defaults",
        unres.len(),
        dflts.len()
    );
    let mut failures = unres.drain(|entry| resolve_reference(entry, &nodes));
    failures.extend(dflts.drain(|entry| resolve_default(entry, &nodes)));
    if !failures.is_empty() {
        return Err(CompileError::Unresolved(failures));
    }

    cctx.pop_scope();
    let module = CompiledModule {
        name: name.to_string(),
        revision: cctx.revision.clone(),
        namespace,
        prefix,
        imports,
        typedefs,
        groupings: module_groupings
            .iter()
            .map(|s| GroupingDef {
                name: s.arg.clone().unwrap_or_default(),
                body: (*s).clone(),
            })
            .collect(),
        extension_defs,
        description,
        reference,
        nodes,
        extensions: std::mem::take(&mut cctx.extensions),
        module_ext_ids,
    };
    debug!(
        "compiled module {} ({} nodes, {} extension instances)",
        module.name,
        module.nodes.len(),
        module.extensions.len()
    );
    Ok(module)
}

fn compile_import(cctx: &mut CompileCtx<'_>, stmt: &ParsedStmt) -> Result<String, CompileError> {
    let target = require_arg(cctx, stmt)?.to_string();
    cctx.path.push_tag("import");
    cctx.path.push_tag_value(&target);
    let table = builtin_table(StmtKind::Import).expect("import table");
    let result = compile_substatements(cctx, table, &stmt.children);
    cctx.path.pop();
    cctx.path.pop();
    let substmts = result?;

    let prefix = match substmts.first_arg(StmtKind::Prefix) {
        Some(p) if !p.is_empty() => p.to_string(),
        _ => {
            return Err(CompileError::InvalidArgument {
                stmt: StmtKind::Prefix,
                reason: "missing argument".to_string(),
                path: cctx.path.render(),
            });
        }
    };
    // Dependencies must have finished compilation before they can be
    // imported; this is what establishes the inter-module partial order.
    if cctx.ctx.module(&target).is_none() {
        return Err(CompileError::MissingDependency {
            module: cctx.module.clone(),
            import: target,
        });
    }
    cctx.imports.push((prefix, target.clone()));
    Ok(target)
}

fn compile_extension_def(
    cctx: &mut CompileCtx<'_>,
    stmt: &ParsedStmt,
) -> Result<ExtensionDef, CompileError> {
    let name = require_arg(cctx, stmt)?.to_string();
    cctx.path.push_tag("extension");
    cctx.path.push_tag_value(&name);
    let table = builtin_table(StmtKind::Extension).expect("extension table");
    let result = compile_substatements(cctx, table, &stmt.children);
    cctx.path.pop();
    cctx.path.pop();
    let substmts = result?;

    Ok(ExtensionDef {
        name,
        argument: substmts
            .first_arg(StmtKind::Argument)
            .map(str::to_string),
        description: substmts
            .first_arg(StmtKind::Description)
            .map(str::to_string),
    })
}

fn compile_typedef<'p>(
    cctx: &mut CompileCtx<'p>,
    stmt: &'p ParsedStmt,
) -> Result<CompiledTypedef, CompileError> {
    let name = require_arg(cctx, stmt)?;
    cctx.path.push_tag("typedef");
    cctx.path.push_tag_value(name);
    let result = compile_typedef_body(cctx, stmt, name);
    cctx.path.pop();
    cctx.path.pop();
    result
}

fn compile_typedef_body<'p>(
    cctx: &mut CompileCtx<'p>,
    stmt: &'p ParsedStmt,
    name: &str,
) -> Result<CompiledTypedef, CompileError> {
    let table = builtin_table(StmtKind::Typedef).expect("typedef table");
    let mut counts = vec![0usize; table.len()];
    let mut type_stmt = None;
    let mut units = None;
    let mut default = None;
    let mut description = None;
    let mut reference = None;
    let mut status = Status::Current;

    for child in &stmt.children {
        let Some(idx) = table.position(child.kind) else {
            return Err(CompileError::UnsupportedStatement {
                stmt: child.kind,
                path: cctx.path.render(),
            });
        };
        counts[idx] += 1;
        match child.kind {
            StmtKind::Type => type_stmt = Some(child),
            StmtKind::Units => units = Some(require_arg(cctx, child)?.to_string()),
            StmtKind::Default => default = Some(require_arg(cctx, child)?.to_string()),
            StmtKind::Description => description = child.arg.clone(),
            StmtKind::Reference => reference = child.arg.clone(),
            StmtKind::Status => status = parse_status(cctx, child)?,
            _ => {}
        }
    }
    check_cardinalities(table, &counts, &cctx.path)?;

    let type_stmt = type_stmt.expect("cardinality check guarantees a type");
    let qualified = format!("{}:{name}", cctx.mod_def);
    let base = cctx.with_typedef_guard(&qualified, |cctx| compile_type(cctx, type_stmt))?;

    if let Some(value) = &default {
        // Leafref defaults stay unchecked here; the target only exists at
        // a point of instantiation.
        if base.base != BuiltinType::Leafref && !base.base.accepts(value) {
            return Err(CompileError::InvalidArgument {
                stmt: StmtKind::Default,
                reason: format!("\"{value}\" is not a valid {} value", base.name),
                path: cctx.path.render(),
            });
        }
    }

    Ok(CompiledTypedef {
        name: name.to_string(),
        module: cctx.mod_def.clone(),
        base,
        units,
        default,
        description,
        reference,
        status,
    })
}

fn compile_type<'p>(
    cctx: &mut CompileCtx<'p>,
    stmt: &'p ParsedStmt,
) -> Result<CompiledType, CompileError> {
    let written = require_arg(cctx, stmt)?;
    let mut target = None;
    for child in &stmt.children {
        match child.kind {
            StmtKind::Path => {
                if target.is_some() {
                    return Err(CompileError::TooManyInstances {
                        stmt: StmtKind::Path,
                        path: cctx.path.render(),
                    });
                }
                target = Some(require_arg(cctx, child)?);
            }
            other => {
                return Err(CompileError::UnsupportedStatement {
                    stmt: other,
                    path: cctx.path.render(),
                });
            }
        }
    }

    if let Some(base) = BuiltinType::from_keyword(written) {
        if base == BuiltinType::Leafref {
            let Some(target) = target else {
                return Err(CompileError::MissingSubstatement {
                    stmt: StmtKind::Path,
                    path: cctx.path.render(),
                });
            };
            if !cctx.options.contains(CompileOptions::GROUPING) {
                cctx.unres.defer(Deferred {
                    kind: DeferredKind::LeafrefTarget,
                    expr: target.to_string(),
                    path: cctx.path.render(),
                    anchor: cctx.node_chain.clone(),
                    phase: ResolutionPhase::Structure,
                });
            }
            return Ok(CompiledType {
                name: written.to_string(),
                base,
                path: Some(target.to_string()),
            });
        }
        if target.is_some() {
            return Err(CompileError::UnsupportedStatement {
                stmt: StmtKind::Path,
                path: cctx.path.render(),
            });
        }
        return Ok(CompiledType {
            name: written.to_string(),
            base,
            path: None,
        });
    }
    if target.is_some() {
        return Err(CompileError::UnsupportedStatement {
            stmt: StmtKind::Path,
            path: cctx.path.render(),
        });
    }
    resolve_typedef_ref(cctx, written)
}

fn resolve_typedef_ref<'p>(
    cctx: &mut CompileCtx<'p>,
    written: &str,
) -> Result<CompiledType, CompileError> {
    let (prefix, local) = CompileCtx::split_prefix(written);
    if let Some(pfx) = prefix {
        if Some(pfx) != cctx.prefix.as_deref() {
            // A foreign typedef comes from an already-compiled module, so
            // its base is final and no guard is needed across the border.
            let module_name = match cctx.import_by_prefix(pfx) {
                Some(m) => m.to_string(),
                None => {
                    return Err(CompileError::InvalidArgument {
                        stmt: StmtKind::Type,
                        reason: format!("unknown prefix \"{pfx}\""),
                        path: cctx.path.render(),
                    });
                }
            };
            let ctx = cctx.ctx;
            let typedef = ctx
                .module(&module_name)
                .and_then(|m| m.typedef(local))
                .ok_or_else(|| CompileError::InvalidArgument {
                    stmt: StmtKind::Type,
                    reason: format!("unknown type \"{written}\""),
                    path: cctx.path.render(),
                })?;
            return Ok(CompiledType {
                name: written.to_string(),
                base: typedef.base.base,
                path: typedef.base.path.clone(),
            });
        }
    }

    let def = cctx
        .find_typedef(local)
        .ok_or_else(|| CompileError::InvalidArgument {
            stmt: StmtKind::Type,
            reason: format!("unknown type \"{written}\""),
            path: cctx.path.render(),
        })?;
    let inner_type = def
        .stmt
        .children_of(StmtKind::Type)
        .next()
        .ok_or_else(|| CompileError::MissingSubstatement {
            stmt: StmtKind::Type,
            path: cctx.path.render(),
        })?;
    let qualified = format!("{}:{local}", def.module);
    let inner = cctx.with_typedef_guard(&qualified, |cctx| compile_type(cctx, inner_type))?;
    Ok(CompiledType {
        name: written.to_string(),
        base: inner.base,
        path: inner.path,
    })
}

fn compile_node<'p>(
    cctx: &mut CompileCtx<'p>,
    stmt: &'p ParsedStmt,
) -> Result<CompiledNode, CompileError> {
    let name = require_arg(cctx, stmt)?;
    let foreign = (cctx.mod_def != cctx.module).then(|| cctx.mod_def.clone());
    cctx.path.push(foreign, name);
    cctx.node_chain.push(name.to_string());
    let result = compile_node_body(cctx, stmt, name);
    cctx.node_chain.pop();
    cctx.path.pop();
    result
}

fn compile_node_body<'p>(
    cctx: &mut CompileCtx<'p>,
    stmt: &'p ParsedStmt,
    name: &str,
) -> Result<CompiledNode, CompileError> {
    let kind = match stmt.kind {
        StmtKind::Container => NodeKind::Container,
        StmtKind::Leaf => NodeKind::Leaf,
        StmtKind::LeafList => NodeKind::LeafList,
        StmtKind::List => NodeKind::List,
        other => {
            return Err(CompileError::UnsupportedStatement {
                stmt: other,
                path: cctx.path.render(),
            });
        }
    };
    let table = builtin_table(stmt.kind).expect("node table");

    cctx.push_scope();
    let result = compile_node_children(cctx, stmt, table, kind, name);
    cctx.pop_scope();
    result
}

fn compile_node_children<'p>(
    cctx: &mut CompileCtx<'p>,
    stmt: &'p ParsedStmt,
    table: &SubstmtTable,
    kind: NodeKind,
    name: &str,
) -> Result<CompiledNode, CompileError> {
    // Count occurrences and register local definitions first, so that
    // references earlier in the body can see definitions later in it.
    let mut counts = vec![0usize; table.len()];
    for child in &stmt.children {
        let Some(idx) = table.position(child.kind) else {
            return Err(CompileError::UnsupportedStatement {
                stmt: child.kind,
                path: cctx.path.render(),
            });
        };
        counts[idx] += 1;
        match child.kind {
            StmtKind::Typedef => {
                let tname = require_arg(cctx, child)?;
                let def = ScopedDef {
                    module: cctx.mod_def.clone(),
                    name: tname,
                    stmt: child,
                };
                cctx.register_typedef(def)?;
            }
            StmtKind::Grouping => {
                let gname = require_arg(cctx, child)?;
                let def = ScopedDef {
                    module: cctx.mod_def.clone(),
                    name: gname,
                    stmt: child,
                };
                cctx.register_grouping(def)?;
            }
            _ => {}
        }
    }
    check_cardinalities(table, &counts, &cctx.path)?;

    let mut node = CompiledNode {
        kind,
        name: name.to_string(),
        module: cctx.mod_def.clone(),
        config: true,
        mandatory: false,
        min_elements: None,
        max_elements: None,
        node_type: None,
        units: None,
        default: None,
        musts: Vec::new(),
        when: None,
        keys: Vec::new(),
        description: None,
        reference: None,
        status: Status::Current,
        children: Vec::new(),
        ext_ids: Vec::new(),
    };

    for child in &stmt.children {
        match child.kind {
            StmtKind::Typedef | StmtKind::Grouping => {}
            StmtKind::Container | StmtKind::Leaf | StmtKind::LeafList | StmtKind::List => {
                let compiled = compile_node(cctx, child)?;
                push_child(cctx, &mut node.children, child.kind, compiled)?;
            }
            StmtKind::Uses => compile_uses(cctx, child, &mut node.children)?,
            StmtKind::Type => node.node_type = Some(compile_type(cctx, child)?),
            StmtKind::Units => node.units = Some(require_arg(cctx, child)?.to_string()),
            StmtKind::Default => {
                let value = require_arg(cctx, child)?;
                node.default = Some(value.to_string());
                if !cctx
                    .options
                    .intersects(CompileOptions::NO_DEFAULTS | CompileOptions::GROUPING)
                {
                    cctx.dflts.defer(Deferred {
                        kind: DeferredKind::Default,
                        expr: value.to_string(),
                        path: cctx.path.render(),
                        anchor: cctx.node_chain.clone(),
                        phase: ResolutionPhase::Finalize,
                    });
                }
            }
            StmtKind::Must => {
                let expr = require_arg(cctx, child)?;
                node.musts.push(expr.to_string());
                cctx.unres.defer(Deferred {
                    kind: DeferredKind::Must,
                    expr: expr.to_string(),
                    path: cctx.path.render(),
                    anchor: cctx.node_chain.clone(),
                    phase: ResolutionPhase::Structure,
                });
            }
            StmtKind::When => {
                let expr = require_arg(cctx, child)?;
                node.when = Some(expr.to_string());
                cctx.unres.defer(Deferred {
                    kind: DeferredKind::When,
                    expr: expr.to_string(),
                    path: cctx.path.render(),
                    anchor: cctx.node_chain.clone(),
                    phase: ResolutionPhase::Structure,
                });
            }
            StmtKind::Config => node.config = parse_bool(cctx, child)?,
            StmtKind::Mandatory => node.mandatory = parse_bool(cctx, child)?,
            StmtKind::MinElements => node.min_elements = Some(parse_u32(cctx, child)?),
            StmtKind::MaxElements => node.max_elements = Some(parse_u32(cctx, child)?),
            StmtKind::Key => {
                node.keys = require_arg(cctx, child)?
                    .split_whitespace()
                    .map(str::to_string)
                    .collect();
            }
            StmtKind::Description => node.description = child.arg.clone(),
            StmtKind::Reference => node.reference = child.arg.clone(),
            StmtKind::Status => node.status = parse_status(cctx, child)?,
            _ => {}
        }
    }

    for ext in &stmt.extensions {
        let id = compile_ext_instance(cctx, ext)?;
        node.ext_ids.push(id);
    }

    // List keys must name leaf children of the list.
    for key in &node.keys {
        let found = node
            .children
            .iter()
            .any(|c| c.kind == NodeKind::Leaf && &c.name == key);
        if !found {
            return Err(CompileError::InvalidArgument {
                stmt: StmtKind::Key,
                reason: format!("key leaf \"{key}\" not found"),
                path: cctx.path.render(),
            });
        }
    }

    Ok(node)
}

fn compile_uses<'p>(
    cctx: &mut CompileCtx<'p>,
    stmt: &'p ParsedStmt,
    dest: &mut Vec<CompiledNode>,
) -> Result<(), CompileError> {
    let target = require_arg(cctx, stmt)?;
    cctx.path.push_tag("uses");
    cctx.path.push_tag_value(target);
    let result = compile_uses_inner(cctx, stmt, target, dest);
    cctx.path.pop();
    cctx.path.pop();
    result
}

fn compile_uses_inner<'p>(
    cctx: &mut CompileCtx<'p>,
    stmt: &'p ParsedStmt,
    target: &str,
    dest: &mut Vec<CompiledNode>,
) -> Result<(), CompileError> {
    let table = builtin_table(StmtKind::Uses).expect("uses table");
    let mut counts = vec![0usize; table.len()];
    for child in &stmt.children {
        let Some(idx) = table.position(child.kind) else {
            return Err(CompileError::UnsupportedStatement {
                stmt: child.kind,
                path: cctx.path.render(),
            });
        };
        counts[idx] += 1;
        if child.kind == StmtKind::When {
            let expr = require_arg(cctx, child)?;
            cctx.unres.defer(Deferred {
                kind: DeferredKind::When,
                expr: expr.to_string(),
                path: cctx.path.render(),
                anchor: cctx.node_chain.clone(),
                phase: ResolutionPhase::Structure,
            });
        }
    }
    check_cardinalities(table, &counts, &cctx.path)?;

    let (prefix, local) = CompileCtx::split_prefix(target);
    let foreign_prefix = match prefix {
        Some(pfx) if Some(pfx) != cctx.prefix.as_deref() => Some(pfx),
        _ => None,
    };

    let (def_module, grouping_body): (String, &'p ParsedStmt) = if let Some(pfx) = foreign_prefix {
        let module_name = match cctx.import_by_prefix(pfx) {
            Some(m) => m.to_string(),
            None => {
                return Err(CompileError::InvalidArgument {
                    stmt: StmtKind::Uses,
                    reason: format!("unknown prefix \"{pfx}\""),
                    path: cctx.path.render(),
                });
            }
        };
        let ctx = cctx.ctx;
        let grouping = ctx
            .module(&module_name)
            .and_then(|m| m.grouping(local))
            .ok_or_else(|| CompileError::InvalidArgument {
                stmt: StmtKind::Uses,
                reason: format!("unknown grouping \"{target}\""),
                path: cctx.path.render(),
            })?;
        (module_name, &grouping.body)
    } else {
        let def = cctx
            .find_grouping(local)
            .ok_or_else(|| CompileError::InvalidArgument {
                stmt: StmtKind::Uses,
                reason: format!("unknown grouping \"{target}\""),
                path: cctx.path.render(),
            })?;
        (def.module.clone(), def.stmt)
    };

    let qualified = format!("{def_module}:{local}");
    cctx.used_groupings.insert(qualified.clone());
    expand_grouping(cctx, &qualified, def_module, grouping_body, dest)
}

/// Instantiate a grouping's content into `dest`.
///
/// The grouping guard detects circular expansion; the definition module is
/// switched to the grouping's module for its body so that nested
/// definitions are attributed to the right namespace, and restored on exit.
fn expand_grouping<'p>(
    cctx: &mut CompileCtx<'p>,
    qualified: &str,
    def_module: String,
    body: &'p ParsedStmt,
    dest: &mut Vec<CompiledNode>,
) -> Result<(), CompileError> {
    cctx.with_grouping_guard(qualified, |cctx| {
        cctx.with_definition_module(&def_module, |cctx| {
            cctx.push_scope();
            let result = expand_grouping_body(cctx, body, dest);
            cctx.pop_scope();
            result
        })
    })
}

fn expand_grouping_body<'p>(
    cctx: &mut CompileCtx<'p>,
    body: &'p ParsedStmt,
    dest: &mut Vec<CompiledNode>,
) -> Result<(), CompileError> {
    let table = builtin_table(StmtKind::Grouping).expect("grouping table");
    let mut counts = vec![0usize; table.len()];
    for child in &body.children {
        let Some(idx) = table.position(child.kind) else {
            return Err(CompileError::UnsupportedStatement {
                stmt: child.kind,
                path: cctx.path.render(),
            });
        };
        counts[idx] += 1;
        match child.kind {
            StmtKind::Typedef => {
                let tname = require_arg(cctx, child)?;
                let def = ScopedDef {
                    module: cctx.mod_def.clone(),
                    name: tname,
                    stmt: child,
                };
                cctx.register_typedef(def)?;
            }
            StmtKind::Grouping => {
                let gname = require_arg(cctx, child)?;
                let def = ScopedDef {
                    module: cctx.mod_def.clone(),
                    name: gname,
                    stmt: child,
                };
                cctx.register_grouping(def)?;
            }
            _ => {}
        }
    }
    check_cardinalities(table, &counts, &cctx.path)?;

    for child in &body.children {
        match child.kind {
            kind if kind.is_data_node() => {
                let compiled = compile_node(cctx, child)?;
                push_child(cctx, dest, child.kind, compiled)?;
            }
            StmtKind::Uses => compile_uses(cctx, child, dest)?,
            _ => {}
        }
    }
    Ok(())
}

fn compile_ext_instance(
    cctx: &mut CompileCtx<'_>,
    ext: &ParsedExtInstance,
) -> Result<usize, CompileError> {
    let ctx = cctx.ctx;
    let revision = if ext.module == cctx.module {
        cctx.revision.clone()
    } else {
        ctx.module(&ext.module).and_then(|m| m.revision.clone())
    };
    let descriptor = ctx
        .extensions()
        .find(&ext.module, revision.as_deref(), &ext.name)
        .ok_or_else(|| CompileError::UnknownExtension {
            module: ext.module.clone(),
            name: ext.name.clone(),
            path: cctx.path.render(),
        })?;
    trace!("compiling extension instance {}:{}", ext.module, ext.name);

    let mut instance =
        CompiledExtInstance::new(&ext.module, &ext.name, ext.arg.clone(), Arc::clone(descriptor));
    let plugin = Arc::clone(descriptor.plugin());

    cctx.path.push_tag("extension");
    cctx.path.push_tag_value(format!("{}:{}", ext.module, ext.name));
    instance.begin_compile();
    let result = plugin.compile(cctx, ext, &mut instance);
    cctx.path.pop();
    cctx.path.pop();
    result?;
    instance.finish_compile();

    cctx.extensions.push(instance);
    Ok(cctx.extensions.len() - 1)
}

fn push_child(
    cctx: &CompileCtx<'_>,
    dest: &mut Vec<CompiledNode>,
    kind: StmtKind,
    node: CompiledNode,
) -> Result<(), CompileError> {
    if dest.iter().any(|c| c.name == node.name) {
        return Err(CompileError::DuplicateDefinition {
            kind,
            name: node.name,
            path: cctx.path.render(),
        });
    }
    dest.push(node);
    Ok(())
}

// --- resolution pass -----------------------------------------------------

fn resolve_reference(entry: &Deferred, nodes: &[CompiledNode]) -> Result<(), CompileError> {
    let resolved = match entry.kind {
        DeferredKind::LeafrefTarget => resolve_schema_path(nodes, &entry.anchor, &entry.expr).is_some(),
        DeferredKind::Must | DeferredKind::When => well_formed_expr(&entry.expr),
        DeferredKind::Default => true,
    };
    if resolved {
        Ok(())
    } else {
        Err(CompileError::UnresolvedTarget {
            kind: entry.kind,
            expr: entry.expr.clone(),
            path: entry.path.clone(),
        })
    }
}

fn resolve_default(entry: &Deferred, nodes: &[CompiledNode]) -> Result<(), CompileError> {
    // The anchor may point into a discarded isolation scratch; nothing to
    // check then.
    let Some(node) = lookup_chain(nodes, entry.anchor.iter().map(String::as_str)) else {
        return Ok(());
    };
    let Some(node_type) = &node.node_type else {
        return Ok(());
    };
    let accepted = match node_type.base {
        BuiltinType::Leafref => {
            match node_type
                .path
                .as_deref()
                .and_then(|p| resolve_schema_path(nodes, &entry.anchor, p))
            {
                Some(target) => match target.node_type.as_ref() {
                    Some(t) if t.base != BuiltinType::Leafref => t.base.accepts(&entry.expr),
                    _ => true,
                },
                // An unresolvable target is already reported by the
                // leafref's own deferred entry.
                None => true,
            }
        }
        base => base.accepts(&entry.expr),
    };
    if accepted {
        Ok(())
    } else {
        Err(CompileError::UnresolvedTarget {
            kind: DeferredKind::Default,
            expr: entry.expr.clone(),
            path: entry.path.clone(),
        })
    }
}

fn resolve_schema_path<'a>(
    nodes: &'a [CompiledNode],
    anchor: &[String],
    expr: &str,
) -> Option<&'a CompiledNode> {
    let mut chain: Vec<&str> = if expr.starts_with('/') {
        Vec::new()
    } else {
        anchor.iter().map(String::as_str).collect()
    };
    for segment in expr.split('/').filter(|s| !s.is_empty()) {
        if segment == ".." {
            chain.pop()?;
        } else {
            chain.push(segment.rsplit(':').next().unwrap_or(segment));
        }
    }
    lookup_chain(nodes, chain.into_iter())
}

fn lookup_chain<'a, 'b>(
    nodes: &'a [CompiledNode],
    mut names: impl Iterator<Item = &'b str>,
) -> Option<&'a CompiledNode> {
    let first = names.next()?;
    let mut node = nodes.iter().find(|n| n.name == first)?;
    for name in names {
        node = node.child(name)?;
    }
    Some(node)
}

fn well_formed_expr(expr: &str) -> bool {
    if expr.trim().is_empty() {
        return false;
    }
    let mut parens = 0i32;
    let mut brackets = 0i32;
    for ch in expr.chars() {
        match ch {
            '(' => parens += 1,
            ')' => {
                parens -= 1;
                if parens < 0 {
                    return false;
                }
            }
            '[' => brackets += 1,
            ']' => {
                brackets -= 1;
                if brackets < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    parens == 0 && brackets == 0
}

// --- helpers -------------------------------------------------------------

fn require_arg<'a>(cctx: &CompileCtx<'_>, stmt: &'a ParsedStmt) -> Result<&'a str, CompileError> {
    match stmt.arg.as_deref() {
        Some(arg) if !arg.is_empty() => Ok(arg),
        _ => Err(CompileError::InvalidArgument {
            stmt: stmt.kind,
            reason: "missing argument".to_string(),
            path: cctx.path.render(),
        }),
    }
}

fn parse_bool(cctx: &CompileCtx<'_>, stmt: &ParsedStmt) -> Result<bool, CompileError> {
    match stmt.arg.as_deref() {
        Some("true") => Ok(true),
        Some("false") => Ok(false),
        other => Err(CompileError::InvalidArgument {
            stmt: stmt.kind,
            reason: format!("expected \"true\" or \"false\", got \"{}\"", other.unwrap_or("")),
            path: cctx.path.render(),
        }),
    }
}

fn parse_u32(cctx: &CompileCtx<'_>, stmt: &ParsedStmt) -> Result<u32, CompileError> {
    require_arg(cctx, stmt)?
        .parse()
        .map_err(|_| CompileError::InvalidArgument {
            stmt: stmt.kind,
            reason: "expected a non-negative integer".to_string(),
            path: cctx.path.render(),
        })
}

fn parse_status(cctx: &CompileCtx<'_>, stmt: &ParsedStmt) -> Result<Status, CompileError> {
    let arg = require_arg(cctx, stmt)?;
    Status::from_arg(arg).ok_or_else(|| CompileError::InvalidArgument {
        stmt: StmtKind::Status,
        reason: format!("unknown status \"{arg}\""),
        path: cctx.path.render(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_module(name: &str) -> ParsedStmt {
        ParsedStmt::with_arg(StmtKind::Module, name)
            .child(ParsedStmt::with_arg(StmtKind::Namespace, format!("urn:{name}")))
            .child(ParsedStmt::with_arg(StmtKind::Prefix, name))
    }

    #[test]
    fn minimal_module_compiles() {
        let ctx = Context::new();
        let module = compile_module(&ctx, &minimal_module("m")).unwrap();
        assert_eq!(module.name, "m");
        assert_eq!(module.namespace, "urn:m");
        assert!(module.nodes.is_empty());
    }

    #[test]
    fn module_without_prefix_fails_cardinality() {
        let ctx = Context::new();
        let parsed = ParsedStmt::with_arg(StmtKind::Module, "m")
            .child(ParsedStmt::with_arg(StmtKind::Namespace, "urn:m"));
        let err = compile_module(&ctx, &parsed).unwrap_err();
        assert_eq!(
            err,
            CompileError::MissingSubstatement {
                stmt: StmtKind::Prefix,
                path: "/m".to_string(),
            }
        );
    }

    #[test]
    fn uses_expands_grouping_content_in_place() {
        let ctx = Context::new();
        let parsed = minimal_module("m")
            .child(
                ParsedStmt::with_arg(StmtKind::Grouping, "endpoint")
                    .child(
                        ParsedStmt::with_arg(StmtKind::Leaf, "address")
                            .child(ParsedStmt::with_arg(StmtKind::Type, "string")),
                    )
                    .child(
                        ParsedStmt::with_arg(StmtKind::Leaf, "port")
                            .child(ParsedStmt::with_arg(StmtKind::Type, "uint32")),
                    ),
            )
            .child(
                ParsedStmt::with_arg(StmtKind::Container, "server")
                    .child(ParsedStmt::with_arg(StmtKind::Uses, "endpoint")),
            );

        let module = compile_module(&ctx, &parsed).unwrap();
        let server = module.node("/server").unwrap();
        assert_eq!(server.kind, NodeKind::Container);
        assert_eq!(server.children.len(), 2);
        assert!(module.node("/server/address").is_some());
        assert!(module.node("/server/port").is_some());
    }

    #[test]
    fn typedef_chain_resolves_to_builtin() {
        let ctx = Context::new();
        let parsed = minimal_module("m")
            .child(
                ParsedStmt::with_arg(StmtKind::Typedef, "percent")
                    .child(ParsedStmt::with_arg(StmtKind::Type, "uint32")),
            )
            .child(
                ParsedStmt::with_arg(StmtKind::Typedef, "load")
                    .child(ParsedStmt::with_arg(StmtKind::Type, "percent")),
            )
            .child(
                ParsedStmt::with_arg(StmtKind::Leaf, "cpu")
                    .child(ParsedStmt::with_arg(StmtKind::Type, "load")),
            );

        let module = compile_module(&ctx, &parsed).unwrap();
        let cpu = module.node("/cpu").unwrap();
        assert_eq!(cpu.node_type.as_ref().unwrap().base, BuiltinType::Uint32);
        assert_eq!(module.typedef("load").unwrap().base.base, BuiltinType::Uint32);
    }

    #[test]
    fn circular_typedef_chain_detected() {
        let ctx = Context::new();
        let parsed = minimal_module("m")
            .child(
                ParsedStmt::with_arg(StmtKind::Typedef, "a")
                    .child(ParsedStmt::with_arg(StmtKind::Type, "b")),
            )
            .child(
                ParsedStmt::with_arg(StmtKind::Typedef, "b")
                    .child(ParsedStmt::with_arg(StmtKind::Type, "a")),
            );

        let err = compile_module(&ctx, &parsed).unwrap_err();
        assert!(
            matches!(err, CompileError::CircularReference { kind, .. } if kind == modelscript_core::error::RefKind::Typedef)
        );
    }

    #[test]
    fn list_key_must_name_a_leaf_child() {
        let ctx = Context::new();
        let parsed = minimal_module("m").child(
            ParsedStmt::with_arg(StmtKind::List, "route")
                .child(ParsedStmt::with_arg(StmtKind::Key, "prefix"))
                .child(
                    ParsedStmt::with_arg(StmtKind::Leaf, "metric")
                        .child(ParsedStmt::with_arg(StmtKind::Type, "uint32")),
                ),
        );

        let err = compile_module(&ctx, &parsed).unwrap_err();
        assert!(matches!(err, CompileError::InvalidArgument { stmt, .. } if stmt == StmtKind::Key));
    }

    #[test]
    fn nodes_record_their_definition_module() {
        let ctx = Context::new();
        let parsed = minimal_module("m").child(
            ParsedStmt::with_arg(StmtKind::Container, "c")
                .child(ParsedStmt::with_arg(StmtKind::Leaf, "x").child(ParsedStmt::with_arg(
                    StmtKind::Type,
                    "string",
                ))),
        );
        let module = compile_module(&ctx, &parsed).unwrap();
        assert_eq!(module.node("/c/x").unwrap().module, "m");
    }
}
