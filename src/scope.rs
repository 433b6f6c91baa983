//! Lexical environments for the interpreter.
//!
//! Scopes live in an arena and refer to their parent by index. A call
//! pushes a child of the calling scope and pops it once the body has been
//! rendered, so the stack top is always the active scope.

use std::collections::{BTreeMap, HashMap};

use crate::ast::Node;

/// Key prefix marking a binding as a variable.
pub const SIGIL: char = '$';

/// Body of a declared function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionBody<'p> {
    /// Unevaluated syntax from a `\f` definition.
    Node(&'p Node),
    /// Literal text bound by `\var` or a call argument.
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredFunction<'p> {
    pub params: Vec<String>,
    pub body: FunctionBody<'p>,
}

impl<'p> DeclaredFunction<'p> {
    /// A zero-parameter function wrapping `text`.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            params: Vec::new(),
            body: FunctionBody::Text(text.into()),
        }
    }

    #[must_use]
    pub const fn node(params: Vec<String>, body: &'p Node) -> Self {
        Self {
            params,
            body: FunctionBody::Node(body),
        }
    }
}

#[derive(Debug, Default)]
struct Scope<'p> {
    bindings: HashMap<String, DeclaredFunction<'p>>,
    parent: Option<usize>,
}

/// Stack of scopes; index 0 is the root.
#[derive(Debug)]
pub struct Scopes<'p> {
    scopes: Vec<Scope<'p>>,
}

impl Default for Scopes<'_> {
    fn default() -> Self {
        Self {
            scopes: vec![Scope::default()],
        }
    }
}

impl<'p> Scopes<'p> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the active scope.
    #[must_use]
    pub fn current(&self) -> usize {
        self.scopes.len() - 1
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Push a child of the active scope and make it active.
    pub fn push(&mut self) -> usize {
        let parent = self.current();
        self.scopes.push(Scope {
            bindings: HashMap::new(),
            parent: Some(parent),
        });
        self.current()
    }

    /// Discard the active scope. The root is never popped.
    pub fn pop(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    #[must_use]
    pub fn parent(&self, scope: usize) -> Option<usize> {
        self.scopes.get(scope).and_then(|s| s.parent)
    }

    pub fn define(
        &mut self,
        scope: usize,
        name: impl Into<String>,
        function: DeclaredFunction<'p>,
    ) {
        if let Some(scope) = self.scopes.get_mut(scope) {
            scope.bindings.insert(name.into(), function);
        }
    }

    /// Binding declared directly in `scope`.
    #[must_use]
    pub fn get_local(&self, scope: usize, name: &str) -> Option<&DeclaredFunction<'p>> {
        self.scopes.get(scope)?.bindings.get(name)
    }

    /// Resolve `name` from `scope` outward.
    #[must_use]
    pub fn lookup(&self, scope: usize, name: &str) -> Option<&DeclaredFunction<'p>> {
        let mut cursor = Some(scope);
        while let Some(index) = cursor {
            let scope = self.scopes.get(index)?;
            if let Some(function) = scope.bindings.get(name) {
                return Some(function);
            }
            cursor = scope.parent;
        }
        None
    }

    /// Remove a binding from `scope` only. Returns whether it existed.
    pub fn remove(&mut self, scope: usize, name: &str) -> bool {
        self.scopes
            .get_mut(scope)
            .is_some_and(|s| s.bindings.remove(name).is_some())
    }

    /// Every text variable visible from `scope`, keyed without the sigil.
    /// Inner bindings hide outer ones.
    #[must_use]
    pub fn variables(&self, scope: usize) -> BTreeMap<String, String> {
        let mut variables = BTreeMap::new();
        let mut cursor = Some(scope);
        while let Some(index) = cursor {
            let Some(scope) = self.scopes.get(index) else {
                break;
            };
            for (key, function) in &scope.bindings {
                let Some(name) = key.strip_prefix(SIGIL) else {
                    continue;
                };
                let FunctionBody::Text(text) = &function.body else {
                    continue;
                };
                variables
                    .entry(name.to_string())
                    .or_insert_with(|| text.clone());
            }
            cursor = scope.parent;
        }
        variables
    }
}
