use ast::{
    ClassMember, Decl, Expr, ModuleDecl, ModuleItem, ObjectPatProp, OptChainBase, Pat, Prop,
    PropName, PropOrSpread, Stmt, UnaryOp,
};

use crate::TreeshakeOptions;

/// What executing a top-level statement may observably do. The scan stays at
/// statement granularity and never descends into function bodies; a function
/// only has effects once something calls it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EffectScan {
    /// Calls, mutations, throws and anything else that must be kept.
    pub hard: bool,
    /// Bare property reads, only effects under `property_read_side_effects`.
    pub property_read: bool,
    /// A top-level `await` was seen.
    pub top_level_await: bool,
}

impl EffectScan {
    pub const NONE: EffectScan = EffectScan {
        hard: false,
        property_read: false,
        top_level_await: false,
    };

    pub const HARD: EffectScan = EffectScan {
        hard: true,
        property_read: false,
        top_level_await: false,
    };

    const PROPERTY_READ: EffectScan = EffectScan {
        hard: false,
        property_read: true,
        top_level_await: false,
    };

    fn merge(self, other: EffectScan) -> EffectScan {
        EffectScan {
            hard: self.hard || other.hard,
            property_read: self.property_read || other.property_read,
            top_level_await: self.top_level_await || other.top_level_await,
        }
    }

    /// Whether the scanned statement must be retained under the given policy.
    pub fn has_effects(&self, options: &TreeshakeOptions) -> bool {
        self.hard || (self.property_read && options.property_read_side_effects)
    }
}

pub fn side_effect_of_module_item(item: &ModuleItem) -> EffectScan {
    match item {
        ModuleItem::ModuleDecl(module_decl) => side_effect_of_module_decl(module_decl),
        ModuleItem::Stmt(stmt) => side_effect_of_stmt(stmt),
    }
}

pub fn side_effect_of_module_decl(decl: &ModuleDecl) -> EffectScan {
    match decl {
        // import statements are structural; whether a bare `import "pkg"` is
        // kept depends on the resolved target, decided during inclusion
        ModuleDecl::Import(_) => EffectScan::NONE,
        ModuleDecl::ExportDecl(node) => side_effect_of_decl(&node.decl),
        ModuleDecl::ExportNamed(_) => EffectScan::NONE,
        ModuleDecl::ExportDefaultDecl(node) => match &node.decl {
            ast::DefaultDecl::Class(class) => side_effect_of_class(&class.class),
            _ => EffectScan::NONE,
        },
        ModuleDecl::ExportDefaultExpr(node) => side_effect_of_expr(node.expr.as_ref()),
        ModuleDecl::ExportAll(_) => EffectScan::NONE,
        ModuleDecl::TsImportEquals(_)
        | ModuleDecl::TsExportAssignment(_)
        | ModuleDecl::TsNamespaceExport(_) => EffectScan::NONE,
    }
}

pub fn side_effect_of_stmt(stmt: &Stmt) -> EffectScan {
    match stmt {
        Stmt::Block(node) => node
            .stmts
            .iter()
            .fold(EffectScan::NONE, |acc, stmt| acc.merge(side_effect_of_stmt(stmt))),
        Stmt::Empty(_) => EffectScan::NONE,
        Stmt::Debugger(_) => EffectScan::HARD,
        Stmt::With(_) => EffectScan::HARD,
        Stmt::Return(_) => EffectScan::HARD,
        Stmt::Labeled(node) => side_effect_of_stmt(node.body.as_ref()),
        Stmt::Break(_) | Stmt::Continue(_) => EffectScan::NONE,
        Stmt::If(node) => {
            let mut scan = side_effect_of_expr(node.test.as_ref())
                .merge(side_effect_of_stmt(node.cons.as_ref()));
            if let Some(alt) = &node.alt {
                scan = scan.merge(side_effect_of_stmt(alt.as_ref()));
            }
            scan
        }
        Stmt::Switch(node) => {
            let mut scan = side_effect_of_expr(node.discriminant.as_ref());
            for case in &node.cases {
                if let Some(test) = &case.test {
                    scan = scan.merge(side_effect_of_expr(test.as_ref()));
                }
                for stmt in &case.cons {
                    scan = scan.merge(side_effect_of_stmt(stmt));
                }
            }
            scan
        }
        Stmt::Throw(_) => EffectScan::HARD,
        Stmt::Try(node) => {
            let mut scan = node
                .block
                .stmts
                .iter()
                .fold(EffectScan::NONE, |acc, stmt| acc.merge(side_effect_of_stmt(stmt)));
            if let Some(handler) = &node.handler {
                scan = scan.merge(
                    handler
                        .body
                        .stmts
                        .iter()
                        .fold(EffectScan::NONE, |acc, stmt| {
                            acc.merge(side_effect_of_stmt(stmt))
                        }),
                );
            }
            if let Some(finalizer) = &node.finalizer {
                scan = scan.merge(finalizer.stmts.iter().fold(EffectScan::NONE, |acc, stmt| {
                    acc.merge(side_effect_of_stmt(stmt))
                }));
            }
            scan
        }
        // loops may not terminate, retain them wholesale
        Stmt::While(_) | Stmt::DoWhile(_) | Stmt::For(_) | Stmt::ForIn(_) | Stmt::ForOf(_) => {
            EffectScan::HARD
        }
        Stmt::Decl(decl) => side_effect_of_decl(decl),
        Stmt::Expr(node) => side_effect_of_expr(node.expr.as_ref()),
    }
}

pub fn side_effect_of_decl(decl: &Decl) -> EffectScan {
    match decl {
        Decl::Class(node) => side_effect_of_class(&node.class),
        Decl::Fn(_) => EffectScan::NONE,
        Decl::Var(node) => node.decls.iter().fold(EffectScan::NONE, |acc, declarator| {
            let mut scan = acc.merge(side_effect_of_pat(&declarator.name));
            if let Some(init) = &declarator.init {
                scan = scan.merge(side_effect_of_expr(init.as_ref()));
            }
            scan
        }),
        Decl::TsInterface(_) | Decl::TsTypeAlias(_) | Decl::TsEnum(_) | Decl::TsModule(_) => {
            EffectScan::NONE
        }
    }
}

fn side_effect_of_class(class: &ast::Class) -> EffectScan {
    let mut scan = class
        .super_class
        .as_ref()
        .map(|expr| side_effect_of_expr(expr.as_ref()))
        .unwrap_or(EffectScan::NONE);
    for member in &class.body {
        scan = scan.merge(match member {
            ClassMember::StaticBlock(_) => EffectScan::HARD,
            ClassMember::Method(method) => side_effect_of_prop_name(&method.key),
            ClassMember::ClassProp(prop) => {
                let mut scan = side_effect_of_prop_name(&prop.key);
                // static initializers run at class definition time
                if prop.is_static {
                    if let Some(value) = &prop.value {
                        scan = scan.merge(side_effect_of_expr(value.as_ref()));
                    }
                }
                scan
            }
            ClassMember::PrivateProp(prop) => {
                if prop.is_static {
                    prop.value
                        .as_ref()
                        .map(|value| side_effect_of_expr(value.as_ref()))
                        .unwrap_or(EffectScan::NONE)
                } else {
                    EffectScan::NONE
                }
            }
            _ => EffectScan::NONE,
        });
    }
    scan
}

fn side_effect_of_prop_name(name: &PropName) -> EffectScan {
    match name {
        PropName::Computed(computed) => side_effect_of_expr(computed.expr.as_ref()),
        _ => EffectScan::NONE,
    }
}

fn side_effect_of_pat(pat: &Pat) -> EffectScan {
    match pat {
        Pat::Ident(_) | Pat::Invalid(_) => EffectScan::NONE,
        Pat::Array(node) => node
            .elems
            .iter()
            .flatten()
            .fold(EffectScan::NONE, |acc, pat| acc.merge(side_effect_of_pat(pat))),
        Pat::Rest(node) => side_effect_of_pat(node.arg.as_ref()),
        Pat::Object(node) => node.props.iter().fold(EffectScan::NONE, |acc, prop| {
            acc.merge(match prop {
                ObjectPatProp::KeyValue(kv) => {
                    side_effect_of_prop_name(&kv.key).merge(side_effect_of_pat(kv.value.as_ref()))
                }
                ObjectPatProp::Assign(assign) => assign
                    .value
                    .as_ref()
                    .map(|value| side_effect_of_expr(value.as_ref()))
                    .unwrap_or(EffectScan::NONE),
                ObjectPatProp::Rest(rest) => side_effect_of_pat(rest.arg.as_ref()),
            })
        }),
        Pat::Assign(node) => {
            side_effect_of_pat(node.left.as_ref()).merge(side_effect_of_expr(node.right.as_ref()))
        }
        Pat::Expr(expr) => side_effect_of_expr(expr.as_ref()),
    }
}

pub fn side_effect_of_expr(expr: &Expr) -> EffectScan {
    match expr {
        Expr::This(_) => EffectScan::NONE,
        Expr::Array(array_lit) => array_lit
            .elems
            .iter()
            .flatten()
            .fold(EffectScan::NONE, |acc, elem| {
                let scan = side_effect_of_expr(elem.expr.as_ref());
                // spreading invokes the iterator protocol
                if elem.spread.is_some() {
                    acc.merge(EffectScan::HARD)
                } else {
                    acc.merge(scan)
                }
            }),
        Expr::Object(object_lit) => {
            object_lit
                .props
                .iter()
                .fold(EffectScan::NONE, |acc, prop| {
                    acc.merge(match prop {
                        PropOrSpread::Spread(spread) => {
                            side_effect_of_expr(spread.expr.as_ref()).merge(EffectScan::HARD)
                        }
                        PropOrSpread::Prop(prop) => match prop.as_ref() {
                            Prop::Shorthand(_) => EffectScan::NONE,
                            Prop::KeyValue(kv) => side_effect_of_prop_name(&kv.key)
                                .merge(side_effect_of_expr(kv.value.as_ref())),
                            Prop::Assign(assign) => side_effect_of_expr(assign.value.as_ref()),
                            Prop::Getter(getter) => side_effect_of_prop_name(&getter.key),
                            Prop::Setter(setter) => side_effect_of_prop_name(&setter.key),
                            Prop::Method(method) => side_effect_of_prop_name(&method.key),
                        },
                    })
                })
        }
        Expr::Fn(_) | Expr::Arrow(_) => EffectScan::NONE,
        Expr::Class(class_expr) => side_effect_of_class(&class_expr.class),
        Expr::Unary(unary_expr) => {
            if unary_expr.op == UnaryOp::Delete {
                EffectScan::HARD
            } else {
                side_effect_of_expr(unary_expr.arg.as_ref())
            }
        }
        // `++v`, `--v`, `v++`, `v--`
        Expr::Update(_) => EffectScan::HARD,
        Expr::Bin(bin_expr) => side_effect_of_expr(bin_expr.left.as_ref())
            .merge(side_effect_of_expr(bin_expr.right.as_ref())),
        Expr::Assign(_) => EffectScan::HARD,
        Expr::Member(member_expr) => {
            let mut scan = EffectScan::PROPERTY_READ.merge(side_effect_of_expr(member_expr.obj.as_ref()));
            if let ast::MemberProp::Computed(computed) = &member_expr.prop {
                scan = scan.merge(side_effect_of_expr(computed.expr.as_ref()));
            }
            scan
        }
        Expr::SuperProp(_) => EffectScan::PROPERTY_READ,
        Expr::Cond(cond_expr) => side_effect_of_expr(cond_expr.test.as_ref())
            .merge(side_effect_of_expr(cond_expr.cons.as_ref()))
            .merge(side_effect_of_expr(cond_expr.alt.as_ref())),
        Expr::Call(_) | Expr::New(_) | Expr::TaggedTpl(_) => EffectScan::HARD,
        Expr::Seq(seq_expr) => seq_expr
            .exprs
            .iter()
            .fold(EffectScan::NONE, |acc, expr| acc.merge(side_effect_of_expr(expr))),
        Expr::Ident(_) | Expr::Lit(_) => EffectScan::NONE,
        Expr::Tpl(tpl) => tpl
            .exprs
            .iter()
            .fold(EffectScan::NONE, |acc, expr| acc.merge(side_effect_of_expr(expr))),
        Expr::Yield(_) => EffectScan::HARD,
        Expr::MetaProp(_) => EffectScan::NONE,
        Expr::Await(await_expr) => {
            let mut scan = EffectScan::HARD.merge(side_effect_of_expr(await_expr.arg.as_ref()));
            scan.top_level_await = true;
            scan
        }
        Expr::Paren(paren_expr) => side_effect_of_expr(paren_expr.expr.as_ref()),
        Expr::JSXMember(_)
        | Expr::JSXNamespacedName(_)
        | Expr::JSXEmpty(_)
        | Expr::JSXElement(_)
        | Expr::JSXFragment(_) => EffectScan::HARD,
        Expr::TsTypeAssertion(node) => side_effect_of_expr(node.expr.as_ref()),
        Expr::TsConstAssertion(node) => side_effect_of_expr(node.expr.as_ref()),
        Expr::TsNonNull(node) => side_effect_of_expr(node.expr.as_ref()),
        Expr::TsAs(node) => side_effect_of_expr(node.expr.as_ref()),
        Expr::TsInstantiation(node) => side_effect_of_expr(node.expr.as_ref()),
        Expr::PrivateName(_) => EffectScan::NONE,
        Expr::OptChain(opt_chain) => match &opt_chain.base {
            OptChainBase::Member(member) => {
                EffectScan::PROPERTY_READ.merge(side_effect_of_expr(member.obj.as_ref()))
            }
            OptChainBase::Call(_) => EffectScan::HARD,
        },
        Expr::Invalid(_) => EffectScan::HARD,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::parse_file;
    use crate::ParseOptions;
    use swc_common::{sync::Lrc, SourceMap};

    fn scan_first(code: &str) -> EffectScan {
        let cm: Lrc<SourceMap> = Default::default();
        let module = parse_file(code.to_string(), "test.js", &cm, &ParseOptions::default())
            .expect("fixture should parse");
        side_effect_of_module_item(&module.body[0])
    }

    #[test]
    fn literals_and_declarations_are_inert() {
        assert_eq!(scan_first("const a = 1;"), EffectScan::NONE);
        assert_eq!(scan_first("function f() { impure(); }"), EffectScan::NONE);
        assert_eq!(scan_first("const neg = -1;"), EffectScan::NONE);
        assert_eq!(scan_first("export const a = [1, 2];"), EffectScan::NONE);
    }

    #[test]
    fn calls_are_hard_effects_even_inside_initializers() {
        assert!(scan_first("f();").hard);
        assert!(scan_first("const a = f();").hard);
        assert!(scan_first("export const a = new Thing();").hard);
        assert!(scan_first("const tagged = tag`x`;").hard);
    }

    #[test]
    fn property_reads_are_soft_effects() {
        let scan = scan_first("config.flag;");
        assert!(scan.property_read);
        assert!(!scan.hard);
        assert!(scan.has_effects(&TreeshakeOptions::default()));
        let relaxed = TreeshakeOptions {
            property_read_side_effects: false,
            ..Default::default()
        };
        assert!(!scan.has_effects(&relaxed));
    }

    #[test]
    fn a_call_is_not_masked_by_a_preceding_property_read() {
        let scan = scan_first("a.b, f();");
        assert!(scan.hard);
        assert!(scan.property_read);
    }

    #[test]
    fn top_level_await_is_flagged() {
        let scan = scan_first("await ready;");
        assert!(scan.top_level_await);
        assert!(scan.hard);
    }
}
