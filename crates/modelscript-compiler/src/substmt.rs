//! The generic substatement compiler.
//!
//! Given a declarative [`SubstmtTable`], consumes a statement's children in
//! source order, validates their kinds and occurrence counts, compiles each
//! child (recursively re-entering this same contract for kinds with their
//! own grammar), and stores the results. The one routine serves every
//! statement kind that has substatements, built-in or plugin-defined.

use modelscript_core::error::CompileError;
use modelscript_core::parsed::ParsedStmt;
use modelscript_core::substmt::{CompiledStmt, CompiledSubstmts, SubstmtTable};

use crate::builtin::builtin_table;
use crate::context::CompileCtx;
use crate::path::PathTracker;

/// Compile a statement's children against a table.
///
/// On success every destination slot reflects exactly the statements
/// present, in source order for multi-valued slots. On failure the error
/// carries the rendered path at the point of failure.
pub fn compile_substatements(
    cctx: &mut CompileCtx<'_>,
    table: &SubstmtTable,
    children: &[ParsedStmt],
) -> Result<CompiledSubstmts, CompileError> {
    let mut counts = vec![0usize; table.len()];
    let mut storage = CompiledSubstmts::for_table(table);

    for child in children {
        let Some(idx) = table.position(child.kind) else {
            return Err(CompileError::UnsupportedStatement {
                stmt: child.kind,
                path: cctx.path.render(),
            });
        };
        counts[idx] += 1;
        let compiled = compile_generic(cctx, child)?;
        storage.store(compiled);
    }

    check_cardinalities(table, &counts, &cctx.path)?;
    Ok(storage)
}

/// Enforce the occurrence-count rules of a table against observed counts.
///
/// Shared between the generic compiler above and the structured statement
/// drivers, so every statement body answers to the same cardinality rules.
pub(crate) fn check_cardinalities(
    table: &SubstmtTable,
    counts: &[usize],
    path: &PathTracker,
) -> Result<(), CompileError> {
    for (desc, &count) in table.descriptors().iter().zip(counts) {
        if desc.cardinality.required() && count == 0 {
            return Err(CompileError::MissingSubstatement {
                stmt: desc.stmt,
                path: path.render(),
            });
        }
        if !desc.cardinality.multiple() && count > 1 {
            return Err(CompileError::TooManyInstances {
                stmt: desc.stmt,
                path: path.render(),
            });
        }
    }
    Ok(())
}

/// Compile one child statement generically: argument plus, for kinds with
/// their own grammar, a recursive table match of its children.
fn compile_generic(
    cctx: &mut CompileCtx<'_>,
    stmt: &ParsedStmt,
) -> Result<CompiledStmt, CompileError> {
    cctx.path.push_tag(stmt.kind.keyword());
    let result = compile_generic_inner(cctx, stmt);
    cctx.path.pop();
    result
}

fn compile_generic_inner(
    cctx: &mut CompileCtx<'_>,
    stmt: &ParsedStmt,
) -> Result<CompiledStmt, CompileError> {
    let mut compiled = CompiledStmt::new(stmt.kind, stmt.arg.clone());
    if !stmt.children.is_empty() {
        match builtin_table(stmt.kind) {
            Some(table) => {
                compiled =
                    compiled.with_substmts(compile_substatements(cctx, table, &stmt.children)?);
            }
            None => {
                return Err(CompileError::UnsupportedStatement {
                    stmt: stmt.children[0].kind,
                    path: cctx.path.render(),
                });
            }
        }
    }
    Ok(compiled)
}
