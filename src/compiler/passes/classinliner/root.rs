//! Discovery of candidate roots.

use std::fmt;

use crate::{
    analysis::ssa::{InstrId, SsaFunction, SsaOp, SsaVarId},
    compiler::{context::CompilerContext, summary::FieldFacts},
    metadata::{program::Program, token::Token},
};

/// How a root produces its object.
#[derive(Debug, Clone, PartialEq)]
pub enum RootKind {
    /// `new C` in the method itself.
    Allocation {
        /// The allocated class.
        class: Token,
    },
    /// Read of a static field known to hold one initialized instance.
    Singleton {
        /// The static field read.
        field: Token,
        /// Facts about the instance the field holds.
        facts: FieldFacts,
    },
}

/// An instruction whose result is a candidate for scalar replacement.
#[derive(Debug, Clone, PartialEq)]
pub struct Root {
    /// The allocation or static read.
    pub instr: InstrId,
    /// Block holding the instruction when it was discovered.
    pub block: usize,
    /// The candidate object.
    pub value: SsaVarId,
    /// Allocation or singleton read.
    pub kind: RootKind,
}

impl Root {
    /// Returns the class of the candidate, if known.
    #[must_use]
    pub fn class(&self) -> Option<Token> {
        match &self.kind {
            RootKind::Allocation { class } => Some(*class),
            RootKind::Singleton { facts, .. } => facts.exact_type,
        }
    }

    /// Returns `true` for singleton reads.
    #[must_use]
    pub fn is_singleton(&self) -> bool {
        matches!(self.kind, RootKind::Singleton { .. })
    }

    /// Returns `true` if the root instruction is still in `ssa` unchanged.
    #[must_use]
    pub fn is_live(&self, ssa: &SsaFunction) -> bool {
        ssa.instruction(self.instr)
            .is_some_and(|instr| instr.def() == Some(self.value))
    }
}

impl fmt::Display for Root {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            RootKind::Allocation { class } => {
                write!(f, "new {} at {} in B{}", class, self.instr, self.block)
            }
            RootKind::Singleton { field, .. } => {
                write!(f, "singleton {} at {} in B{}", field, self.instr, self.block)
            }
        }
    }
}

/// Collects the roots of `ssa` in instruction order.
///
/// Static reads become roots only when whole-program facts pin the exact
/// class of the instance the field holds.
#[must_use]
pub fn find_roots(ssa: &SsaFunction, program: &Program, ctx: &CompilerContext) -> Vec<Root> {
    let reachable = ssa.reachable_blocks();
    ssa.iter_instructions()
        .filter(|(b, _, _)| reachable.get(*b).copied().unwrap_or(false))
        .filter_map(|(block, _, instr)| {
            let kind = match instr.op() {
                SsaOp::NewInstance { class, .. } => RootKind::Allocation {
                    class: class.token(),
                },
                SsaOp::LoadStaticField { field, .. } => {
                    let facts = ctx.field_facts(program, field.token())?;
                    facts.exact_type?;
                    RootKind::Singleton {
                        field: field.token(),
                        facts,
                    }
                }
                _ => return None,
            };
            Some(Root {
                instr: instr.id(),
                block,
                value: instr.def()?,
                kind,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::ssa::{SsaFunctionBuilder, ValueType},
        metadata::program::{ClassFlags, FieldFlags},
    };

    #[test]
    fn test_finds_allocations_in_reachable_blocks() {
        let mut program = Program::new();
        let class = program.add_class("Box", ClassFlags::empty(), None);
        let ctx = CompilerContext::new();
        let ctor = program.root_constructor();

        let mut ssa = SsaFunctionBuilder::new(0).build_with(|f| {
            f.block(0, |b| {
                b.new_object(class, ctor, &[]);
                b.ret();
            });
            f.block(1, |b| {
                b.new_instance(class);
                b.ret();
            });
        });

        let roots = find_roots(&ssa, &program, &ctx);
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].class(), Some(class));
        assert_eq!(roots[0].block, 0);
        assert!(!roots[0].is_singleton());
        assert!(roots[0].is_live(&ssa));

        ssa.remove_instruction(roots[0].instr);
        assert!(!roots[0].is_live(&ssa));
    }

    #[test]
    fn test_static_read_without_facts_is_not_a_root() {
        let mut program = Program::new();
        let holder = program.add_class("Holder", ClassFlags::empty(), None);
        let field = program
            .add_field(
                holder,
                "INSTANCE",
                FieldFlags::STATIC,
                ValueType::Reference,
            )
            .unwrap();
        let ctx = CompilerContext::from_program(&program);

        let ssa = SsaFunctionBuilder::new(0).build_with(|f| {
            f.block(0, |b| {
                let v = b.load_static(field);
                b.ret_val(v);
            });
        });

        assert!(find_roots(&ssa, &program, &ctx).is_empty());
    }
}
