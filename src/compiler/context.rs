//! Compiler context for interprocedural optimization.
//!
//! The [`CompilerContext`] holds the interprocedural state the SSA passes
//! share: the working method bodies, the method summaries computed from the
//! original program, lazily derived class and field facts, and the policy
//! sets that exclude methods or classes from inlining.
//!
//! All collection fields use thread-safe types (`DashMap`, `DashSet`) so the
//! [`PassScheduler`](crate::compiler::PassScheduler) can process methods in
//! parallel.

use std::time::{Duration, Instant};

use dashmap::{DashMap, DashSet};
use rayon::prelude::*;

use crate::{
    analysis::ssa::SsaFunction,
    compiler::{
        events::EventLog,
        summary::{ClassInitializerInfo, FieldFacts, MethodSummary},
    },
    metadata::{
        program::{ClassFlags, Program},
        token::Token,
    },
};

/// Shared state of one compilation.
pub struct CompilerContext {
    /// Working SSA form of each method with a body.
    pub ssa_functions: DashMap<Token, SsaFunction>,

    /// Summaries computed from the original bodies.
    pub summaries: DashMap<Token, MethodSummary>,

    /// Accumulated events from all passes.
    pub events: EventLog,

    /// Methods changed by at least one pass.
    pub processed_methods: DashSet<Token>,

    /// Methods the inliners must not inline.
    pub no_inline: DashSet<Token>,

    /// Classes whose instances must not be scalar replaced, such as classes
    /// instantiated by code outside the program.
    pub no_class_inline: DashSet<Token>,

    /// Classes whose candidates skip the class inlining budget.
    pub always_inline: DashSet<Token>,

    /// Methods that were inlined at least once.
    pub inlined_methods: DashSet<Token>,

    /// Static initialization facts per class.
    class_initializers: DashMap<Token, ClassInitializerInfo>,

    /// Supplied or derived facts per static field. `None` caches a failed
    /// derivation.
    field_facts: DashMap<Token, Option<FieldFacts>>,

    /// When the context was created.
    start_time: Instant,
}

impl Default for CompilerContext {
    fn default() -> Self {
        Self::new()
    }
}

impl CompilerContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ssa_functions: DashMap::new(),
            summaries: DashMap::new(),
            events: EventLog::new(),
            processed_methods: DashSet::new(),
            no_inline: DashSet::new(),
            no_class_inline: DashSet::new(),
            always_inline: DashSet::new(),
            inlined_methods: DashSet::new(),
            class_initializers: DashMap::new(),
            field_facts: DashMap::new(),
            start_time: Instant::now(),
        }
    }

    /// Creates a context holding a working copy of every body in `program`
    /// and a summary of every method.
    #[must_use]
    pub fn from_program(program: &Program) -> Self {
        let ctx = Self::new();
        ctx.load_program(program);
        ctx
    }

    /// Copies the bodies of `program` into the context and summarizes every
    /// method. Methods without a body get an unknown summary.
    pub fn load_program(&self, program: &Program) {
        let methods: Vec<_> = program.methods().collect();
        methods.par_iter().for_each(|def| {
            let summary = match &def.body {
                Some(body) => {
                    self.ssa_functions.insert(def.token, body.clone());
                    MethodSummary::compute(def, body)
                }
                None => MethodSummary::unknown(def.token, def.arg_count()),
            };
            self.summaries.insert(def.token, summary);
        });
    }

    /// Returns the elapsed time since the context was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    // ── Summary access ──────────────────────────────────────────────────

    /// Executes a closure with a reference to the method summary.
    pub fn with_summary<R, F>(&self, token: Token, f: F) -> Option<R>
    where
        F: FnOnce(&MethodSummary) -> R,
    {
        self.summaries.get(&token).map(|r| f(&r))
    }

    /// Returns a copy of the method summary.
    #[must_use]
    pub fn summary(&self, token: Token) -> Option<MethodSummary> {
        self.summaries.get(&token).map(|r| r.clone())
    }

    /// Adds or replaces a method summary.
    pub fn set_summary(&self, summary: MethodSummary) {
        self.summaries.insert(summary.token, summary);
    }

    /// Returns the estimated inlined size of a method.
    #[must_use]
    pub fn estimated_size(&self, token: Token) -> Option<usize> {
        self.summaries.get(&token).map(|r| r.estimated_size)
    }

    // ── Class and field facts ───────────────────────────────────────────

    /// Returns the static initialization facts of `class`, computing them on
    /// first use.
    pub fn class_initializer(&self, program: &Program, class: Token) -> ClassInitializerInfo {
        if let Some(info) = self.class_initializers.get(&class) {
            return info.clone();
        }
        let info = ClassInitializerInfo::compute(program, class, |m| self.summary(m));
        self.class_initializers
            .entry(class)
            .or_insert(info)
            .value()
            .clone()
    }

    /// Supplies the facts of a static field, overriding derivation.
    pub fn set_field_facts(&self, field: Token, facts: FieldFacts) {
        self.field_facts.insert(field, Some(facts));
    }

    /// Returns the facts of a static field, deriving them on first use.
    pub fn field_facts(&self, program: &Program, field: Token) -> Option<FieldFacts> {
        if let Some(facts) = self.field_facts.get(&field) {
            return facts.clone();
        }
        let facts = FieldFacts::derive(program, field, |m| self.summary(m));
        self.field_facts
            .entry(field)
            .or_insert(facts)
            .value()
            .clone()
    }

    // ── Policy ──────────────────────────────────────────────────────────

    /// Checks if instances of `class` are excluded from class inlining.
    #[must_use]
    pub fn is_class_inlining_excluded(&self, program: &Program, class: Token) -> bool {
        self.no_class_inline.contains(&class)
            || program
                .class(class)
                .is_some_and(|c| c.flags.contains(ClassFlags::NO_CLASS_INLINING))
    }

    /// Checks if candidates of `class` bypass the class inlining budget.
    #[must_use]
    pub fn is_always_inline(&self, program: &Program, class: Token) -> bool {
        self.always_inline.contains(&class)
            || program
                .class(class)
                .is_some_and(|c| c.flags.contains(ClassFlags::ALWAYS_INLINE))
    }

    /// Marks a method as having been inlined at least once.
    pub fn mark_inlined(&self, token: Token) {
        self.inlined_methods.insert(token);
    }

    /// Checks if a method was inlined at least once.
    #[must_use]
    pub fn was_inlined(&self, token: Token) -> bool {
        self.inlined_methods.contains(&token)
    }

    // ── SSA function access ─────────────────────────────────────────────

    /// Executes a closure with a reference to the SSA function.
    pub fn with_ssa<R, F>(&self, token: Token, f: F) -> Option<R>
    where
        F: FnOnce(&SsaFunction) -> R,
    {
        self.ssa_functions.get(&token).map(|r| f(&r))
    }

    /// Stores an SSA function for a method.
    pub fn set_ssa(&self, token: Token, ssa: SsaFunction) {
        self.ssa_functions.insert(token, ssa);
    }

    /// Removes and returns the SSA function for a method.
    pub fn take_ssa(&self, token: Token) -> Option<SsaFunction> {
        self.ssa_functions.remove(&token).map(|(_, v)| v)
    }

    /// Returns all method tokens that have SSA functions, in token order.
    #[must_use]
    pub fn all_methods(&self) -> Vec<Token> {
        let mut tokens: Vec<Token> = self.ssa_functions.iter().map(|r| *r.key()).collect();
        tokens.sort_unstable();
        tokens
    }

    /// Returns the count of methods with SSA representations.
    #[must_use]
    pub fn method_count(&self) -> usize {
        self.ssa_functions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::ssa::SsaFunctionBuilder,
        metadata::program::{ClassFlags, MethodFlags},
    };

    #[test]
    fn test_from_program_loads_bodies_and_summaries() {
        let mut program = Program::new();
        let class = program.add_class("Box", ClassFlags::empty(), None);
        let get = program
            .add_method(class, "get", MethodFlags::empty(), 0)
            .unwrap();
        let native = program
            .add_method(class, "native", MethodFlags::NATIVE, 1)
            .unwrap();
        program
            .set_body(
                get,
                SsaFunctionBuilder::new(1).build_with(|f| {
                    f.block(0, |b| {
                        let v = b.const_i32(3);
                        b.ret_val(v);
                    });
                }),
            )
            .unwrap();

        let ctx = CompilerContext::from_program(&program);
        assert!(ctx.with_ssa(get, |_| ()).is_some());
        assert!(ctx.with_ssa(native, |_| ()).is_none());
        assert_eq!(ctx.estimated_size(get), Some(2));
        assert_eq!(ctx.estimated_size(native), Some(usize::MAX));
        assert_eq!(
            ctx.class_initializer(&program, class),
            ClassInitializerInfo::None
        );
    }

    #[test]
    fn test_policy_sets_and_flags() {
        let mut program = Program::new();
        let flagged = program.add_class("Flagged", ClassFlags::NO_CLASS_INLINING, None);
        let plain = program.add_class("Plain", ClassFlags::empty(), None);

        let ctx = CompilerContext::from_program(&program);
        assert!(ctx.is_class_inlining_excluded(&program, flagged));
        assert!(!ctx.is_class_inlining_excluded(&program, plain));

        ctx.no_class_inline.insert(plain);
        assert!(ctx.is_class_inlining_excluded(&program, plain));

        ctx.always_inline.insert(plain);
        assert!(ctx.is_always_inline(&program, plain));
        assert!(!ctx.is_always_inline(&program, flagged));
    }

    #[test]
    fn test_supplied_field_facts_win() {
        let mut program = Program::new();
        let class = program.add_class("Holder", ClassFlags::empty(), None);
        let ctx = CompilerContext::from_program(&program);
        let field = Token::field(1);
        assert!(ctx.field_facts(&program, field).is_none());

        let facts = FieldFacts {
            exact_type: Some(class),
            object_state: Vec::new(),
        };
        ctx.set_field_facts(field, facts.clone());
        assert_eq!(ctx.field_facts(&program, field), Some(facts));
    }
}
