use hashbrown::{HashMap, HashSet};
use swc_atoms::JsWord;
use swc_ecma_visit::{Visit, VisitWith};

use ast::{
    ArrowExpr, AssignExpr, BindingIdent, BlockStmt, BreakStmt, CatchClause, ClassDecl, ClassExpr,
    Constructor, ContinueStmt, Decl, FnDecl, FnExpr, ForInStmt, ForOfStmt, ForStmt, Function,
    Ident, LabeledStmt, MemberExpr, ModuleDecl, ModuleItem, ObjectPatProp, ParamOrTsParamProp,
    Pat, PatOrExpr, PrivateName, PropName, SetterProp, Stmt, SuperPropExpr, VarDecl, VarDeclKind,
    VarDeclOrExpr, VarDeclOrPat,
};

/// Names every module can see without declaring them. `find_variable` is
/// idempotent and registers a sentinel for anything it has not seen yet.
#[derive(Debug)]
pub struct GlobalScope {
    variables: HashMap<JsWord, GlobalVariable>,
}

#[derive(Debug, Clone)]
pub struct GlobalVariable {
    pub name: JsWord,
}

impl Default for GlobalScope {
    fn default() -> Self {
        let mut scope = Self {
            variables: HashMap::new(),
        };
        for preset in ["module", "exports", "_interopDefault", "_missingExportShim"] {
            scope.find_variable(&preset.into());
        }
        scope
    }
}

impl GlobalScope {
    pub fn find_variable(&mut self, name: &JsWord) -> &GlobalVariable {
        self.variables
            .entry(name.clone())
            .or_insert_with(|| GlobalVariable { name: name.clone() })
    }

    pub fn contains(&self, name: &JsWord) -> bool {
        self.variables.contains_key(name)
    }
}

#[derive(Debug)]
struct Scope {
    names: HashSet<JsWord>,
    is_block: bool,
}

#[derive(Debug, Default)]
struct ScopeStack {
    scopes: Vec<Scope>,
}

impl ScopeStack {
    fn push(&mut self, is_block: bool) {
        self.scopes.push(Scope {
            names: HashSet::new(),
            is_block,
        });
    }

    fn pop(&mut self) {
        self.scopes.pop();
    }

    fn declare_lexical(&mut self, name: JsWord) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.names.insert(name);
        }
    }

    /// `var` declarations attach to the nearest function scope.
    fn declare_var(&mut self, name: JsWord) {
        for scope in self.scopes.iter_mut().rev() {
            if !scope.is_block {
                scope.names.insert(name);
                return;
            }
        }
        if let Some(scope) = self.scopes.first_mut() {
            scope.names.insert(name);
        }
    }

    fn contains(&self, name: &JsWord) -> bool {
        self.scopes.iter().any(|scope| scope.names.contains(name))
    }
}

/// Collects the free variables of one top-level statement: every identifier
/// reference that is not bound by the statement's own declarations or any
/// scope nested inside it. Order follows the source; duplicates collapse.
pub struct ReferenceScanner {
    scopes: ScopeStack,
    seen: HashSet<JsWord>,
    references: Vec<JsWord>,
}

impl ReferenceScanner {
    fn new(own_defines: &HashSet<JsWord>) -> Self {
        let mut scopes = ScopeStack::default();
        scopes.push(false);
        for name in own_defines {
            scopes.declare_lexical(name.clone());
        }
        Self {
            scopes,
            seen: HashSet::new(),
            references: Vec::new(),
        }
    }

    fn add_reference(&mut self, name: &JsWord) {
        if self.scopes.contains(name) {
            return;
        }
        if self.seen.insert(name.clone()) {
            self.references.push(name.clone());
        }
    }

    fn declare_pat(&mut self, pat: &Pat, lexical: bool) {
        let mut names = Vec::new();
        collect_pat_names(pat, &mut names);
        for name in names {
            if lexical {
                self.scopes.declare_lexical(name);
            } else {
                self.scopes.declare_var(name);
            }
        }
    }

    /// Hoist `var` and function declarations into the current (function)
    /// scope without crossing nested function boundaries.
    fn hoist_stmt(&mut self, stmt: &Stmt) {
        let mut names = Vec::new();
        collect_hoisted_names(stmt, &mut names);
        for name in names {
            self.scopes.declare_var(name);
        }
    }

    fn enter_function(&mut self, function: &Function) {
        self.scopes.push(false);
        for param in &function.params {
            self.declare_pat(&param.pat, false);
        }
        if let Some(body) = &function.body {
            for stmt in &body.stmts {
                self.hoist_stmt(stmt);
            }
        }
        for param in &function.params {
            param.pat.visit_with(self);
        }
        if let Some(body) = &function.body {
            body.visit_with(self);
        }
        self.scopes.pop();
    }

    /// Destructuring assignment targets are references, not declarations.
    fn record_assignment_target(&mut self, pat: &Pat) {
        match pat {
            Pat::Ident(binding) => self.add_reference(&binding.id.sym),
            Pat::Array(array) => {
                for pat in array.elems.iter().flatten() {
                    self.record_assignment_target(pat);
                }
            }
            Pat::Rest(rest) => self.record_assignment_target(rest.arg.as_ref()),
            Pat::Object(object) => {
                for prop in &object.props {
                    match prop {
                        ObjectPatProp::KeyValue(kv) => {
                            kv.key.visit_with(self);
                            self.record_assignment_target(kv.value.as_ref());
                        }
                        ObjectPatProp::Assign(assign) => {
                            self.add_reference(&assign.key.sym);
                            if let Some(value) = &assign.value {
                                value.visit_with(self);
                            }
                        }
                        ObjectPatProp::Rest(rest) => {
                            self.record_assignment_target(rest.arg.as_ref())
                        }
                    }
                }
            }
            Pat::Assign(assign) => {
                self.record_assignment_target(assign.left.as_ref());
                assign.right.visit_with(self);
            }
            Pat::Expr(expr) => expr.visit_with(self),
            Pat::Invalid(_) => {}
        }
    }
}

impl Visit for ReferenceScanner {
    fn visit_ident(&mut self, node: &Ident) {
        self.add_reference(&node.sym);
    }

    fn visit_binding_ident(&mut self, _node: &BindingIdent) {
        // declaration position
    }

    fn visit_member_expr(&mut self, node: &MemberExpr) {
        node.obj.visit_with(self);
        if let ast::MemberProp::Computed(computed) = &node.prop {
            computed.expr.visit_with(self);
        }
    }

    fn visit_super_prop_expr(&mut self, node: &SuperPropExpr) {
        if let ast::SuperProp::Computed(computed) = &node.prop {
            computed.expr.visit_with(self);
        }
    }

    fn visit_prop_name(&mut self, node: &PropName) {
        if let PropName::Computed(computed) = node {
            computed.expr.visit_with(self);
        }
    }

    fn visit_private_name(&mut self, _node: &PrivateName) {}

    fn visit_assign_expr(&mut self, node: &AssignExpr) {
        match &node.left {
            PatOrExpr::Pat(pat) => self.record_assignment_target(pat.as_ref()),
            PatOrExpr::Expr(expr) => expr.visit_with(self),
        }
        node.right.visit_with(self);
    }

    fn visit_fn_decl(&mut self, node: &FnDecl) {
        // the name was declared by the enclosing scope's hoisting pass
        self.enter_function(&node.function);
    }

    fn visit_fn_expr(&mut self, node: &FnExpr) {
        self.scopes.push(false);
        if let Some(ident) = &node.ident {
            self.scopes.declare_lexical(ident.sym.clone());
        }
        self.enter_function(&node.function);
        self.scopes.pop();
    }

    fn visit_function(&mut self, node: &Function) {
        self.enter_function(node);
    }

    fn visit_arrow_expr(&mut self, node: &ArrowExpr) {
        self.scopes.push(false);
        for pat in &node.params {
            self.declare_pat(pat, false);
        }
        if let ast::BlockStmtOrExpr::BlockStmt(body) = &node.body {
            for stmt in &body.stmts {
                self.hoist_stmt(stmt);
            }
        }
        for pat in &node.params {
            pat.visit_with(self);
        }
        node.body.visit_with(self);
        self.scopes.pop();
    }

    fn visit_class_decl(&mut self, node: &ClassDecl) {
        node.class.visit_with(self);
    }

    fn visit_class_expr(&mut self, node: &ClassExpr) {
        self.scopes.push(true);
        if let Some(ident) = &node.ident {
            self.scopes.declare_lexical(ident.sym.clone());
        }
        node.class.visit_with(self);
        self.scopes.pop();
    }

    fn visit_block_stmt(&mut self, node: &BlockStmt) {
        self.scopes.push(true);
        for stmt in &node.stmts {
            if let Stmt::Decl(decl) = stmt {
                match decl {
                    Decl::Class(class) => self.scopes.declare_lexical(class.ident.sym.clone()),
                    Decl::Fn(func) => self.scopes.declare_lexical(func.ident.sym.clone()),
                    Decl::Var(var) if var.kind != VarDeclKind::Var => {
                        for declarator in &var.decls {
                            self.declare_pat(&declarator.name, true);
                        }
                    }
                    _ => {}
                }
            }
        }
        node.visit_children_with(self);
        self.scopes.pop();
    }

    fn visit_var_decl(&mut self, node: &VarDecl) {
        for declarator in &node.decls {
            self.declare_pat(&declarator.name, node.kind != VarDeclKind::Var);
        }
        node.visit_children_with(self);
    }

    fn visit_catch_clause(&mut self, node: &CatchClause) {
        self.scopes.push(true);
        if let Some(param) = &node.param {
            self.declare_pat(param, true);
            param.visit_with(self);
        }
        node.body.visit_with(self);
        self.scopes.pop();
    }

    fn visit_for_stmt(&mut self, node: &ForStmt) {
        self.scopes.push(true);
        if let Some(init) = &node.init {
            match init {
                VarDeclOrExpr::VarDecl(var) => var.visit_with(self),
                VarDeclOrExpr::Expr(expr) => expr.visit_with(self),
            }
        }
        if let Some(test) = &node.test {
            test.visit_with(self);
        }
        if let Some(update) = &node.update {
            update.visit_with(self);
        }
        node.body.visit_with(self);
        self.scopes.pop();
    }

    fn visit_for_in_stmt(&mut self, node: &ForInStmt) {
        self.scopes.push(true);
        match &node.left {
            VarDeclOrPat::VarDecl(var) => var.visit_with(self),
            VarDeclOrPat::Pat(pat) => self.record_assignment_target(pat),
        }
        node.right.visit_with(self);
        node.body.visit_with(self);
        self.scopes.pop();
    }

    fn visit_for_of_stmt(&mut self, node: &ForOfStmt) {
        self.scopes.push(true);
        match &node.left {
            VarDeclOrPat::VarDecl(var) => var.visit_with(self),
            VarDeclOrPat::Pat(pat) => self.record_assignment_target(pat),
        }
        node.right.visit_with(self);
        node.body.visit_with(self);
        self.scopes.pop();
    }

    fn visit_constructor(&mut self, node: &Constructor) {
        self.scopes.push(false);
        for param in &node.params {
            if let ParamOrTsParamProp::Param(param) = param {
                self.declare_pat(&param.pat, false);
            }
        }
        if let Some(body) = &node.body {
            for stmt in &body.stmts {
                self.hoist_stmt(stmt);
            }
        }
        for param in &node.params {
            if let ParamOrTsParamProp::Param(param) = param {
                param.pat.visit_with(self);
            }
        }
        if let Some(body) = &node.body {
            body.visit_with(self);
        }
        self.scopes.pop();
    }

    fn visit_setter_prop(&mut self, node: &SetterProp) {
        self.scopes.push(false);
        self.declare_pat(&node.param, false);
        node.param.visit_with(self);
        if let Some(body) = &node.body {
            for stmt in &body.stmts {
                self.hoist_stmt(stmt);
            }
            body.visit_with(self);
        }
        self.scopes.pop();
    }

    fn visit_labeled_stmt(&mut self, node: &LabeledStmt) {
        node.body.visit_with(self);
    }

    fn visit_break_stmt(&mut self, _node: &BreakStmt) {}

    fn visit_continue_stmt(&mut self, _node: &ContinueStmt) {}
}

/// Free variables of one top-level module item given the names it declares
/// itself. Import and bare re-export statements reference nothing.
pub fn collect_statement_references(
    item: &ModuleItem,
    own_defines: &HashSet<JsWord>,
) -> Vec<JsWord> {
    let mut scanner = ReferenceScanner::new(own_defines);
    match item {
        ModuleItem::ModuleDecl(module_decl) => match module_decl {
            ModuleDecl::Import(_) | ModuleDecl::ExportAll(_) => {}
            ModuleDecl::ExportNamed(_) => {}
            ModuleDecl::ExportDecl(node) => node.decl.visit_with(&mut scanner),
            ModuleDecl::ExportDefaultDecl(node) => match &node.decl {
                ast::DefaultDecl::Fn(func) => {
                    scanner.enter_function(&func.function);
                }
                ast::DefaultDecl::Class(class) => class.class.visit_with(&mut scanner),
                ast::DefaultDecl::TsInterfaceDecl(_) => {}
            },
            ModuleDecl::ExportDefaultExpr(node) => node.expr.visit_with(&mut scanner),
            _ => {}
        },
        ModuleItem::Stmt(stmt) => stmt.visit_with(&mut scanner),
    }
    scanner.references
}

/// Names bound by a binding pattern.
pub fn collect_pat_names(pat: &Pat, out: &mut Vec<JsWord>) {
    match pat {
        Pat::Ident(binding) => out.push(binding.id.sym.clone()),
        Pat::Array(array) => {
            for pat in array.elems.iter().flatten() {
                collect_pat_names(pat, out);
            }
        }
        Pat::Rest(rest) => collect_pat_names(rest.arg.as_ref(), out),
        Pat::Object(object) => {
            for prop in &object.props {
                match prop {
                    ObjectPatProp::KeyValue(kv) => collect_pat_names(kv.value.as_ref(), out),
                    ObjectPatProp::Assign(assign) => out.push(assign.key.sym.clone()),
                    ObjectPatProp::Rest(rest) => collect_pat_names(rest.arg.as_ref(), out),
                }
            }
        }
        Pat::Assign(assign) => collect_pat_names(assign.left.as_ref(), out),
        Pat::Expr(_) | Pat::Invalid(_) => {}
    }
}

/// `var` and function declarations hoisted out of nested blocks, without
/// crossing into nested functions.
pub fn collect_hoisted_names(stmt: &Stmt, out: &mut Vec<JsWord>) {
    match stmt {
        Stmt::Decl(Decl::Var(var)) if var.kind == VarDeclKind::Var => {
            for declarator in &var.decls {
                collect_pat_names(&declarator.name, out);
            }
        }
        Stmt::Decl(Decl::Fn(func)) => out.push(func.ident.sym.clone()),
        Stmt::Block(block) => {
            for stmt in &block.stmts {
                collect_hoisted_names(stmt, out);
            }
        }
        Stmt::If(node) => {
            collect_hoisted_names(node.cons.as_ref(), out);
            if let Some(alt) = &node.alt {
                collect_hoisted_names(alt.as_ref(), out);
            }
        }
        Stmt::While(node) => collect_hoisted_names(node.body.as_ref(), out),
        Stmt::DoWhile(node) => collect_hoisted_names(node.body.as_ref(), out),
        Stmt::For(node) => {
            if let Some(VarDeclOrExpr::VarDecl(var)) = &node.init {
                if var.kind == VarDeclKind::Var {
                    for declarator in &var.decls {
                        collect_pat_names(&declarator.name, out);
                    }
                }
            }
            collect_hoisted_names(node.body.as_ref(), out);
        }
        Stmt::ForIn(node) => {
            if let VarDeclOrPat::VarDecl(var) = &node.left {
                if var.kind == VarDeclKind::Var {
                    for declarator in &var.decls {
                        collect_pat_names(&declarator.name, out);
                    }
                }
            }
            collect_hoisted_names(node.body.as_ref(), out);
        }
        Stmt::ForOf(node) => {
            if let VarDeclOrPat::VarDecl(var) = &node.left {
                if var.kind == VarDeclKind::Var {
                    for declarator in &var.decls {
                        collect_pat_names(&declarator.name, out);
                    }
                }
            }
            collect_hoisted_names(node.body.as_ref(), out);
        }
        Stmt::Labeled(node) => collect_hoisted_names(node.body.as_ref(), out),
        Stmt::Try(node) => {
            for stmt in &node.block.stmts {
                collect_hoisted_names(stmt, out);
            }
            if let Some(handler) = &node.handler {
                for stmt in &handler.body.stmts {
                    collect_hoisted_names(stmt, out);
                }
            }
            if let Some(finalizer) = &node.finalizer {
                for stmt in &finalizer.stmts {
                    collect_hoisted_names(stmt, out);
                }
            }
        }
        Stmt::Switch(node) => {
            for case in &node.cases {
                for stmt in &case.cons {
                    collect_hoisted_names(stmt, out);
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

    fn references_of(code: &str) -> Vec<String> {
        let cm: Lrc<SourceMap> = Default::default();
        let module = parse_file(code.to_string(), "test.js", &cm, &ParseOptions::default())
            .expect("fixture should parse");
        let item = &module.body[0];
        let mut defines = HashSet::new();
        if let ModuleItem::Stmt(stmt) = item {
            let mut names = Vec::new();
            collect_hoisted_names(stmt, &mut names);
            if let Stmt::Decl(decl) = stmt {
                match decl {
                    Decl::Class(class) => names.push(class.ident.sym.clone()),
                    Decl::Var(var) => {
                        for declarator in &var.decls {
                            collect_pat_names(&declarator.name, &mut names);
                        }
                    }
                    _ => {}
                }
            }
            defines.extend(names);
        }
        collect_statement_references(item, &defines)
            .into_iter()
            .map(|word| word.to_string())
            .collect()
    }

    #[test]
    fn function_parameters_shadow_outer_names() {
        let refs = references_of("function f(x) { return x + y; }");
        assert_eq!(refs, vec!["y"]);
    }

    #[test]
    fn member_properties_are_not_references() {
        let refs = references_of("const a = obj.prop.deep;");
        assert_eq!(refs, vec!["obj"]);
    }

    #[test]
    fn computed_members_and_shorthand_props_are_references() {
        let refs = references_of("const a = { shorthand, [key]: value };");
        assert_eq!(refs, vec!["shorthand", "key", "value"]);
    }

    #[test]
    fn var_hoisting_inside_blocks_is_not_free() {
        let refs = references_of("function f() { { var inner = 1; } return inner; }");
        assert!(refs.is_empty());
    }

    #[test]
    fn assignment_targets_count_as_references() {
        let refs = references_of("target = source;");
        assert_eq!(refs, vec!["target", "source"]);
    }

    #[test]
    fn block_scoped_declarations_do_not_leak() {
        let refs = references_of("{ let x = outer; x(); }");
        assert_eq!(refs, vec!["outer"]);
    }

    #[test]
    fn catch_params_are_scoped() {
        let refs = references_of("try { risky(); } catch (err) { log(err); }");
        assert_eq!(refs, vec!["risky", "log"]);
    }

    #[test]
    fn global_scope_is_idempotent_and_preseeded() {
        let mut scope = GlobalScope::default();
        assert!(scope.contains(&"_missingExportShim".into()));
        let first = scope.find_variable(&"window".into()).name.clone();
        let second = scope.find_variable(&"window".into()).name.clone();
        assert_eq!(first, second);
    }
}
