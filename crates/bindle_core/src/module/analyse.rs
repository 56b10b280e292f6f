use hashbrown::HashMap;
use swc_atoms::JsWord;
use swc_ecma_visit::{Visit, VisitWith};

use ast::{
    Callee, Decl, DefaultDecl, ExportSpecifier, Expr, Lit, ModuleDecl, ModuleExportName,
    ModuleItem,
};

use crate::{collect_pat_names, ResolvedId, DEFAULT_EXPORT_NAME};

/// `import { imported as local } from "source"`, keyed by the local name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDesc {
    pub source: JsWord,
    /// `default` for default imports, `*` for namespace imports.
    pub imported: JsWord,
    pub local: JsWord,
}

/// An exported name backed by a binding of this module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportDesc {
    pub local: JsWord,
    /// Declared name of a default export, when it has one.
    pub identifier: Option<JsWord>,
}

/// `export { imported as exported } from "source"`; `imported` is `*` for
/// `export * as ns from "source"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReExportDesc {
    pub source: JsWord,
    pub imported: JsWord,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DynamicImportExpression {
    /// `import("./specifier")`
    Literal(JsWord),
    /// A non-string argument; only a plugin can resolve it.
    Expression,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DynamicImportResolution {
    /// Replacement source text supplied by a plugin, recorded as-is.
    Replacement(String),
    Module(ResolvedId),
}

#[derive(Debug, Clone)]
pub struct DynamicImportDesc {
    pub expression: DynamicImportExpression,
    pub resolution: Option<DynamicImportResolution>,
}

/// Binding tables scanned from a module body.
#[derive(Debug, Default)]
pub struct ModuleAnalysis {
    /// Static import specifiers, deduplicated, in source order.
    pub sources: Vec<JsWord>,
    pub imports: HashMap<JsWord, ImportDesc>,
    pub exports: HashMap<JsWord, ExportDesc>,
    pub re_exports: HashMap<JsWord, ReExportDesc>,
    /// Exported names (own and re-exported) in source order.
    pub export_names: Vec<JsWord>,
    pub export_all_sources: Vec<JsWord>,
    pub dynamic_imports: Vec<DynamicImportDesc>,
}

impl ModuleAnalysis {
    fn add_source(&mut self, source: JsWord) {
        if !self.sources.contains(&source) {
            self.sources.push(source);
        }
    }

    fn add_export(&mut self, exported: JsWord, desc: ExportDesc) {
        if !self.export_names.contains(&exported) {
            self.export_names.push(exported.clone());
        }
        self.exports.insert(exported, desc);
    }

    fn add_re_export(&mut self, exported: JsWord, desc: ReExportDesc) {
        if !self.export_names.contains(&exported) {
            self.export_names.push(exported.clone());
        }
        self.re_exports.insert(exported, desc);
    }

    fn add_import_decl(&mut self, import_decl: &ast::ImportDecl) {
        let source = import_decl.src.value.clone();
        self.add_source(source.clone());
        for specifier in &import_decl.specifiers {
            let (local, imported) = match specifier {
                ast::ImportSpecifier::Named(named) => (
                    named.local.sym.clone(),
                    named
                        .imported
                        .as_ref()
                        .map(export_name_atom)
                        .unwrap_or_else(|| named.local.sym.clone()),
                ),
                ast::ImportSpecifier::Default(default) => {
                    (default.local.sym.clone(), "default".into())
                }
                ast::ImportSpecifier::Namespace(namespace) => {
                    (namespace.local.sym.clone(), "*".into())
                }
            };
            self.imports.insert(
                local.clone(),
                ImportDesc {
                    source: source.clone(),
                    imported,
                    local,
                },
            );
        }
    }

    fn add_export_decl(&mut self, module_decl: &ModuleDecl) {
        match module_decl {
            ModuleDecl::ExportDefaultDecl(node) => {
                let identifier = match &node.decl {
                    DefaultDecl::Class(class) => class.ident.as_ref().map(|id| id.sym.clone()),
                    DefaultDecl::Fn(func) => func.ident.as_ref().map(|id| id.sym.clone()),
                    DefaultDecl::TsInterfaceDecl(_) => None,
                };
                let local = identifier
                    .clone()
                    .unwrap_or_else(|| DEFAULT_EXPORT_NAME.into());
                self.add_export("default".into(), ExportDesc { local, identifier });
            }
            ModuleDecl::ExportDefaultExpr(node) => {
                let identifier = match node.expr.as_ref() {
                    Expr::Ident(ident) => Some(ident.sym.clone()),
                    _ => None,
                };
                self.add_export(
                    "default".into(),
                    ExportDesc {
                        local: DEFAULT_EXPORT_NAME.into(),
                        identifier,
                    },
                );
            }
            ModuleDecl::ExportNamed(node) => {
                for specifier in &node.specifiers {
                    match specifier {
                        ExportSpecifier::Named(named) => {
                            let orig = export_name_atom(&named.orig);
                            let exported = named
                                .exported
                                .as_ref()
                                .map(export_name_atom)
                                .unwrap_or_else(|| orig.clone());
                            if let Some(source_node) = &node.src {
                                // export { name } from './other'
                                let source = source_node.value.clone();
                                self.add_source(source.clone());
                                self.add_re_export(
                                    exported,
                                    ReExportDesc {
                                        source,
                                        imported: orig,
                                    },
                                );
                            } else {
                                // export { name as exported }
                                self.add_export(
                                    exported,
                                    ExportDesc {
                                        local: orig,
                                        identifier: None,
                                    },
                                );
                            }
                        }
                        ExportSpecifier::Namespace(namespace) => {
                            // export * as ns from './other'
                            let source = node
                                .src
                                .as_ref()
                                .map(|src| src.value.clone())
                                .unwrap_or_default();
                            self.add_source(source.clone());
                            self.add_re_export(
                                export_name_atom(&namespace.name),
                                ReExportDesc {
                                    source,
                                    imported: "*".into(),
                                },
                            );
                        }
                        ExportSpecifier::Default(_) => {
                            // `export v from "mod"` is a stage-1 proposal
                        }
                    }
                }
            }
            ModuleDecl::ExportDecl(node) => match &node.decl {
                Decl::Class(class) => self.add_export(
                    class.ident.sym.clone(),
                    ExportDesc {
                        local: class.ident.sym.clone(),
                        identifier: None,
                    },
                ),
                Decl::Fn(func) => self.add_export(
                    func.ident.sym.clone(),
                    ExportDesc {
                        local: func.ident.sym.clone(),
                        identifier: None,
                    },
                ),
                Decl::Var(var) => {
                    let mut names = Vec::new();
                    for declarator in &var.decls {
                        collect_pat_names(&declarator.name, &mut names);
                    }
                    for name in names {
                        self.add_export(
                            name.clone(),
                            ExportDesc {
                                local: name,
                                identifier: None,
                            },
                        );
                    }
                }
                _ => {}
            },
            ModuleDecl::ExportAll(node) => {
                let source = node.src.value.clone();
                self.add_source(source.clone());
                self.export_all_sources.push(source);
            }
            _ => {}
        }
    }
}

struct DynamicImportCollector<'a> {
    analysis: &'a mut ModuleAnalysis,
}

impl Visit for DynamicImportCollector<'_> {
    fn visit_call_expr(&mut self, node: &ast::CallExpr) {
        if let Callee::Import(_) = node.callee {
            let expression = node
                .args
                .first()
                .filter(|arg| arg.spread.is_none())
                .and_then(|arg| match arg.expr.as_ref() {
                    Expr::Lit(Lit::Str(specifier)) => {
                        Some(DynamicImportExpression::Literal(specifier.value.clone()))
                    }
                    _ => None,
                })
                .unwrap_or(DynamicImportExpression::Expression);
            self.analysis.dynamic_imports.push(DynamicImportDesc {
                expression,
                resolution: None,
            });
        }
        node.visit_children_with(self);
    }
}

/// Scan the binding tables of a parsed module body.
pub fn analyse(body: &[ModuleItem]) -> ModuleAnalysis {
    let mut analysis = ModuleAnalysis::default();
    for item in body {
        if let ModuleItem::ModuleDecl(module_decl) = item {
            if let ModuleDecl::Import(import_decl) = module_decl {
                analysis.add_import_decl(import_decl);
            } else {
                analysis.add_export_decl(module_decl);
            }
        }
        let mut collector = DynamicImportCollector {
            analysis: &mut analysis,
        };
        item.visit_with(&mut collector);
    }
    analysis
}

fn export_name_atom(name: &ModuleExportName) -> JsWord {
    match name {
        ModuleExportName::Ident(ident) => ident.sym.clone(),
        ModuleExportName::Str(value) => value.value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::parse_file;
    use crate::ParseOptions;
    use swc_common::{sync::Lrc, SourceMap};

    fn analyse_code(code: &str) -> ModuleAnalysis {
        let cm: Lrc<SourceMap> = Default::default();
        let module = parse_file(code.to_string(), "test.js", &cm, &ParseOptions::default())
            .expect("fixture should parse");
        analyse(&module.body)
    }

    #[test]
    fn collects_import_shapes() {
        let analysis = analyse_code(
            "import def from './a'; import { x, y as z } from './b'; import * as ns from './c';",
        );
        assert_eq!(
            analysis.sources,
            vec![JsWord::from("./a"), "./b".into(), "./c".into()]
        );
        let def = &analysis.imports[&JsWord::from("def")];
        assert_eq!(def.imported, JsWord::from("default"));
        let z = &analysis.imports[&JsWord::from("z")];
        assert_eq!(z.imported, JsWord::from("y"));
        let ns = &analysis.imports[&JsWord::from("ns")];
        assert_eq!(ns.imported, JsWord::from("*"));
    }

    #[test]
    fn collects_exports_and_re_exports() {
        let analysis = analyse_code(
            "export const a = 1; export { a as b }; export { c } from './c'; export * from './all'; export * as ns from './ns';",
        );
        assert_eq!(analysis.exports[&JsWord::from("a")].local, JsWord::from("a"));
        assert_eq!(analysis.exports[&JsWord::from("b")].local, JsWord::from("a"));
        assert_eq!(
            analysis.re_exports[&JsWord::from("c")].source,
            JsWord::from("./c")
        );
        assert_eq!(analysis.export_all_sources, vec![JsWord::from("./all")]);
        assert_eq!(
            analysis.re_exports[&JsWord::from("ns")].imported,
            JsWord::from("*")
        );
        assert_eq!(
            analysis.export_names,
            vec![
                JsWord::from("a"),
                "b".into(),
                "c".into(),
                "ns".into()
            ]
        );
    }

    #[test]
    fn default_export_keeps_its_declared_name() {
        let analysis = analyse_code("export default function main() {}");
        let desc = &analysis.exports[&JsWord::from("default")];
        assert_eq!(desc.local, JsWord::from("main"));
        assert_eq!(desc.identifier, Some(JsWord::from("main")));
    }

    #[test]
    fn finds_dynamic_imports_anywhere() {
        let analysis =
            analyse_code("const p = import('./lazy'); function go() { return import(dynamic); }");
        assert_eq!(analysis.dynamic_imports.len(), 2);
        assert_eq!(
            analysis.dynamic_imports[0].expression,
            DynamicImportExpression::Literal("./lazy".into())
        );
        assert_eq!(
            analysis.dynamic_imports[1].expression,
            DynamicImportExpression::Expression
        );
        // dynamic specifiers are not static sources
        assert!(analysis.sources.is_empty());
    }
}
