use hashbrown::HashSet;
use swc_atoms::JsWord;

use ast::{Decl, DefaultDecl, ModuleDecl, ModuleItem, Stmt, VarDeclKind};

use crate::utils::side_effect::{side_effect_of_module_item, EffectScan};
use crate::{collect_hoisted_names, collect_pat_names, collect_statement_references, RefBinding};

/// Local name backing an anonymous `export default`.
pub const DEFAULT_EXPORT_NAME: &str = "*default*";

/// One top-level module item together with the analysis the tree-shaker
/// operates on. Inclusion is monotonic: once set it never reverts.
#[derive(Debug, Clone)]
pub struct Statement {
    pub node: ModuleItem,
    pub index: usize,
    pub included: bool,
    pub is_import_declaration: bool,
    pub is_export_declaration: bool,
    /// Top-level bindings this statement declares (hoisting included).
    pub defines: HashSet<JsWord>,
    /// Free variables in source order.
    pub depends_on: Vec<JsWord>,
    pub effects: EffectScan,
    /// Filled during reference binding: where each free variable resolves.
    pub resolved_refs: Vec<(JsWord, RefBinding)>,
}

impl Statement {
    pub fn new(node: ModuleItem, index: usize) -> Self {
        let is_import_declaration =
            matches!(&node, ModuleItem::ModuleDecl(ModuleDecl::Import(_)));
        let is_export_declaration = matches!(
            &node,
            ModuleItem::ModuleDecl(
                ModuleDecl::ExportAll(_)
                    | ModuleDecl::ExportDecl(_)
                    | ModuleDecl::ExportDefaultDecl(_)
                    | ModuleDecl::ExportDefaultExpr(_)
                    | ModuleDecl::ExportNamed(_)
            )
        );
        let defines: HashSet<JsWord> = top_level_defines(&node).into_iter().collect();
        let depends_on = collect_statement_references(&node, &defines);
        let effects = side_effect_of_module_item(&node);
        Self {
            node,
            index,
            included: false,
            is_import_declaration,
            is_export_declaration,
            defines,
            depends_on,
            effects,
            resolved_refs: Vec::new(),
        }
    }

    /// True for statements that only shape the binding tables and never
    /// produce output of their own.
    pub fn is_structural(&self) -> bool {
        matches!(
            &self.node,
            ModuleItem::ModuleDecl(
                ModuleDecl::Import(_) | ModuleDecl::ExportAll(_) | ModuleDecl::ExportNamed(_)
            )
        )
    }
}

/// Names a top-level item introduces into module scope, including `var`
/// bindings hoisted out of nested blocks.
pub fn top_level_defines(item: &ModuleItem) -> Vec<JsWord> {
    let mut names = Vec::new();
    match item {
        ModuleItem::Stmt(stmt) => {
            collect_hoisted_names(stmt, &mut names);
            if let Stmt::Decl(decl) = stmt {
                collect_decl_names(decl, &mut names);
            }
        }
        ModuleItem::ModuleDecl(module_decl) => match module_decl {
            ModuleDecl::ExportDecl(node) => collect_decl_names(&node.decl, &mut names),
            ModuleDecl::ExportDefaultDecl(node) => match &node.decl {
                DefaultDecl::Fn(func) => names.push(
                    func.ident
                        .as_ref()
                        .map(|ident| ident.sym.clone())
                        .unwrap_or_else(|| DEFAULT_EXPORT_NAME.into()),
                ),
                DefaultDecl::Class(class) => names.push(
                    class
                        .ident
                        .as_ref()
                        .map(|ident| ident.sym.clone())
                        .unwrap_or_else(|| DEFAULT_EXPORT_NAME.into()),
                ),
                DefaultDecl::TsInterfaceDecl(_) => {}
            },
            ModuleDecl::ExportDefaultExpr(_) => names.push(DEFAULT_EXPORT_NAME.into()),
            _ => {}
        },
    }
    names
}

fn collect_decl_names(decl: &Decl, out: &mut Vec<JsWord>) {
    match decl {
        Decl::Class(class) => out.push(class.ident.sym.clone()),
        Decl::Fn(func) => {
            // already collected by hoisting for plain statements, but
            // `export function` passes the declaration in directly
            if !out.contains(&func.ident.sym) {
                out.push(func.ident.sym.clone());
            }
        }
        Decl::Var(var) => {
            if var.kind == VarDeclKind::Var {
                // hoisting already saw these for plain statements
                let mut collected = Vec::new();
                for declarator in &var.decls {
                    collect_pat_names(&declarator.name, &mut collected);
                }
                for name in collected {
                    if !out.contains(&name) {
                        out.push(name);
                    }
                }
            } else {
                for declarator in &var.decls {
                    collect_pat_names(&declarator.name, out);
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::parse_file;
    use crate::ParseOptions;
    use swc_common::{sync::Lrc, SourceMap};

    fn statements_of(code: &str) -> Vec<Statement> {
        let cm: Lrc<SourceMap> = Default::default();
        let module = parse_file(code.to_string(), "test.js", &cm, &ParseOptions::default())
            .expect("fixture should parse");
        module
            .body
            .into_iter()
            .enumerate()
            .map(|(index, item)| Statement::new(item, index))
            .collect()
    }

    #[test]
    fn classifies_imports_and_exports() {
        let stmts = statements_of("import a from './a'; export const b = a; b;");
        assert!(stmts[0].is_import_declaration);
        assert!(stmts[0].is_structural());
        assert!(stmts[1].is_export_declaration);
        assert!(!stmts[1].is_structural());
        assert!(!stmts[2].is_export_declaration);
    }

    #[test]
    fn export_decl_defines_and_depends() {
        let stmts = statements_of("export const doubled = base * 2;");
        assert!(stmts[0].defines.contains(&JsWord::from("doubled")));
        assert_eq!(stmts[0].depends_on, vec![JsWord::from("base")]);
    }

    #[test]
    fn default_export_binds_a_synthetic_name() {
        let stmts = statements_of("export default function () { return 1; }");
        assert!(stmts[0].defines.contains(&JsWord::from(DEFAULT_EXPORT_NAME)));
        let stmts = statements_of("export default function named() {}");
        assert!(stmts[0].defines.contains(&JsWord::from("named")));
    }

    #[test]
    fn hoisted_vars_count_as_module_level_defines() {
        let stmts = statements_of("{ var hoisted = 1; }");
        assert!(stmts[0].defines.contains(&JsWord::from("hoisted")));
    }
}
