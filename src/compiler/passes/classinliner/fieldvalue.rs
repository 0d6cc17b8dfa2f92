//! Field values of a scalarized object across the control flow graph.
//!
//! [`FieldValueHelper`] answers "which SSA value does field `f` hold right
//! before this instruction" for one field of one allocation. Stores on the
//! object are its definitions; the allocation itself defines the field's
//! default value. Reads are resolved on demand in the style of Braun et al.,
//! "Simple and Efficient Construction of Static Single Assignment Form":
//! a block with one predecessor takes its predecessor's value, a join block
//! gets a phi, and a phi whose operands all agree is replaced by that value.

use rustc_hash::FxHashMap;

use crate::{
    analysis::ssa::{
        ConstValue, InstrId, PhiNode, PhiOperand, SsaCfg, SsaFunction, SsaOp, SsaVarId,
        VariableOrigin,
    },
    metadata::token::Token,
    Result,
};

/// On-demand SSA construction for one field of one allocation.
#[derive(Debug)]
pub struct FieldValueHelper {
    object: SsaVarId,
    allocation: InstrId,
    field: Token,
    default: ConstValue,
    default_value: Option<SsaVarId>,
    predecessors: Vec<Vec<usize>>,
    entry_values: FxHashMap<usize, SsaVarId>,
    phis_inserted: Vec<(usize, SsaVarId)>,
}

impl FieldValueHelper {
    /// Creates a helper for `field` of the object `object` allocated by
    /// `allocation`.
    ///
    /// The control flow graph is captured here; it must not change while
    /// the helper is in use.
    #[must_use]
    pub fn new(
        ssa: &SsaFunction,
        object: SsaVarId,
        allocation: InstrId,
        field: Token,
        default: ConstValue,
    ) -> Self {
        let cfg = SsaCfg::from_ssa(ssa);
        let predecessors = (0..ssa.block_count())
            .map(|b| cfg.predecessors(b).to_vec())
            .collect();
        Self {
            object,
            allocation,
            field,
            default,
            default_value: None,
            predecessors,
            entry_values: FxHashMap::default(),
            phis_inserted: Vec::new(),
        }
    }

    /// Returns the phis created so far that survived simplification, as
    /// `(block, result)` pairs.
    #[must_use]
    pub fn phis_inserted(&self) -> &[(usize, SsaVarId)] {
        &self.phis_inserted
    }

    /// Returns the value the field holds right before `instr`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if `instr` is not in the function
    /// or some path reaches it without passing the allocation.
    pub fn value_before(&mut self, ssa: &mut SsaFunction, instr: InstrId) -> Result<SsaVarId> {
        let (block, index) = ssa
            .locate(instr)
            .ok_or_else(|| malformed_error!("Instruction {} not found", instr))?;
        match self.last_definition(ssa, block, Some(index))? {
            Some(value) => Ok(value),
            None => self.value_at_entry(ssa, block),
        }
    }

    /// Tells the helper that `old` was replaced by `new` in the function.
    pub fn replaced(&mut self, old: SsaVarId, new: SsaVarId) {
        for value in self.entry_values.values_mut() {
            if *value == old {
                *value = new;
            }
        }
        for (_, value) in &mut self.phis_inserted {
            if *value == old {
                *value = new;
            }
        }
    }

    /// Finds the last definition of the field in `block` before `before`
    /// (or in the whole block).
    fn last_definition(
        &mut self,
        ssa: &mut SsaFunction,
        block: usize,
        before: Option<usize>,
    ) -> Result<Option<SsaVarId>> {
        let Some(instrs) = ssa.block(block).map(|b| b.instructions()) else {
            return Ok(None);
        };
        let end = before.unwrap_or(instrs.len()).min(instrs.len());

        let mut allocated_here = false;
        for instr in instrs[..end].iter().rev() {
            if instr.id() == self.allocation {
                allocated_here = true;
                break;
            }
            if let SsaOp::StoreField {
                object,
                field,
                value,
            } = instr.op()
            {
                if *object == self.object && field.token() == self.field {
                    return Ok(Some(*value));
                }
            }
        }

        if allocated_here {
            return self.default_value(ssa).map(Some);
        }
        Ok(None)
    }

    /// Materializes the field's default value right after the allocation.
    fn default_value(&mut self, ssa: &mut SsaFunction) -> Result<SsaVarId> {
        if let Some(value) = self.default_value {
            return Ok(value);
        }
        let (block, index) = ssa
            .locate(self.allocation)
            .ok_or_else(|| malformed_error!("Allocation {} not found", self.allocation))?;
        let dest = ssa.new_temporary();
        ssa.insert_instruction(
            block,
            index + 1,
            SsaOp::Const {
                dest,
                value: self.default.clone(),
            },
        )?;
        self.default_value = Some(dest);
        Ok(dest)
    }

    fn value_at_end(&mut self, ssa: &mut SsaFunction, block: usize) -> Result<SsaVarId> {
        match self.last_definition(ssa, block, None)? {
            Some(value) => Ok(value),
            None => self.value_at_entry(ssa, block),
        }
    }

    fn value_at_entry(&mut self, ssa: &mut SsaFunction, block: usize) -> Result<SsaVarId> {
        if let Some(value) = self.entry_values.get(&block) {
            return Ok(*value);
        }

        let preds = self.predecessors.get(block).cloned().unwrap_or_default();
        match preds.as_slice() {
            [] => Err(malformed_error!(
                "Field {} read in B{} without a reaching allocation",
                self.field,
                block
            )),
            [single] => {
                let value = self.value_at_end(ssa, *single)?;
                self.entry_values.insert(block, value);
                Ok(value)
            }
            _ => {
                // The empty phi is registered first so loops resolve to it
                let result = ssa.new_variable(VariableOrigin::Phi);
                self.entry_values.insert(block, result);
                let target = ssa
                    .block_mut(block)
                    .ok_or_else(|| malformed_error!("Block B{} does not exist", block))?;
                target.add_phi(PhiNode::new(result, VariableOrigin::Phi));

                for pred in preds {
                    let value = self.value_at_end(ssa, pred)?;
                    if let Some(phi) = ssa
                        .block_mut(block)
                        .and_then(|b| b.phi_nodes_mut().iter_mut().find(|p| p.result() == result))
                    {
                        phi.add_operand(PhiOperand::new(value, pred));
                    }
                }
                Ok(self.remove_trivial_phi(ssa, block, result))
            }
        }
    }

    /// Replaces the phi defining `result` by its single operand value, if
    /// it has one.
    fn remove_trivial_phi(&mut self, ssa: &mut SsaFunction, block: usize, result: SsaVarId) -> SsaVarId {
        let position = ssa
            .block(block)
            .and_then(|b| b.phi_nodes().iter().position(|p| p.result() == result));
        let Some(position) = position else {
            return result;
        };
        let same = ssa
            .block(block)
            .and_then(|b| b.phi(position))
            .and_then(PhiNode::trivial_value);

        match same {
            Some(value) => {
                // Finished phis reading `result` may become trivial in turn
                let users: Vec<(usize, SsaVarId)> = self
                    .phis_inserted
                    .iter()
                    .copied()
                    .filter(|&(b, r)| {
                        r != result
                            && ssa
                                .block(b)
                                .and_then(|blk| blk.phi_nodes().iter().find(|p| p.result() == r))
                                .is_some_and(|p| p.used_variables().any(|v| v == result))
                    })
                    .collect();
                ssa.remove_phi(block, position);
                ssa.replace_uses_including_phis(result, value);
                self.replaced(result, value);
                self.phis_inserted.retain(|entry| !users.contains(entry));

                let mut value = value;
                for (user_block, user) in users {
                    let simplified = self.remove_trivial_phi(ssa, user_block, user);
                    if user == value {
                        value = simplified;
                    }
                }
                value
            }
            None => {
                self.phis_inserted.push((block, result));
                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ssa::{FieldRef, SsaFunctionBuilder, TypeRef};

    fn field() -> Token {
        Token::field(1)
    }

    fn alloc(dest: SsaVarId) -> SsaOp {
        SsaOp::NewInstance {
            dest,
            class: TypeRef::new(Token::type_def(2)),
        }
    }

    fn load(dest: SsaVarId, object: SsaVarId) -> SsaOp {
        SsaOp::LoadField {
            dest,
            object,
            field: FieldRef::new(field()),
        }
    }

    fn find(ssa: &SsaFunction, pred: impl Fn(&SsaOp) -> bool) -> InstrId {
        ssa.iter_instructions()
            .find(|(_, _, i)| pred(i.op()))
            .map(|(_, _, i)| i.id())
            .unwrap()
    }

    fn allocation(ssa: &SsaFunction) -> InstrId {
        find(ssa, |op| matches!(op, SsaOp::NewInstance { .. }))
    }

    fn read(ssa: &SsaFunction) -> InstrId {
        find(ssa, |op| matches!(op, SsaOp::LoadField { .. }))
    }

    #[test]
    fn test_straight_line_read_sees_last_store() {
        let mut object = SsaVarId::new(0);
        let mut ssa = SsaFunctionBuilder::new(0).build_with(|f| {
            object = f.var();
            let v = f.var();
            f.block(0, |b| {
                b.op(alloc(object));
                let one = b.const_i32(1);
                b.store_field(object, field(), one);
                let two = b.const_i32(2);
                b.store_field(object, field(), two);
                b.op(load(v, object));
                b.ret_val(v);
            });
        });

        let mut helper = FieldValueHelper::new(
            &ssa,
            object,
            allocation(&ssa),
            field(),
            ConstValue::I32(0),
        );
        let load = read(&ssa);
        let value = helper.value_before(&mut ssa, load).unwrap();
        assert_eq!(ssa.constant(value), Some(&ConstValue::I32(2)));
        assert!(helper.phis_inserted().is_empty());
    }

    #[test]
    fn test_join_gets_one_phi() {
        let mut object = SsaVarId::new(0);
        let mut ssa = SsaFunctionBuilder::new(1).build_with(|f| {
            let cond = f.arg(0);
            object = f.var();
            let v = f.var();
            f.block(0, |b| {
                b.op(alloc(object));
                let one = b.const_i32(1);
                b.store_field(object, field(), one);
                b.branch(cond, 1, 2);
            });
            f.block(1, |b| {
                let five = b.const_i32(5);
                b.store_field(object, field(), five);
                b.jump(3);
            });
            f.block(2, |b| b.jump(3));
            f.block(3, |b| {
                b.op(load(v, object));
                b.ret_val(v);
            });
        });

        let mut helper = FieldValueHelper::new(
            &ssa,
            object,
            allocation(&ssa),
            field(),
            ConstValue::I32(0),
        );
        let load = read(&ssa);
        let value = helper.value_before(&mut ssa, load).unwrap();

        assert_eq!(helper.phis_inserted(), &[(3, value)]);
        let phi = ssa.block(3).unwrap().phi(0).unwrap();
        assert_eq!(phi.result(), value);
        assert_eq!(phi.operand_count(), 2);
        assert_eq!(ssa.phi_count(), 1);
    }

    #[test]
    fn test_agreeing_paths_need_no_phi() {
        let mut object = SsaVarId::new(0);
        let mut ssa = SsaFunctionBuilder::new(1).build_with(|f| {
            let cond = f.arg(0);
            object = f.var();
            let v = f.var();
            f.block(0, |b| {
                b.op(alloc(object));
                b.branch(cond, 1, 2);
            });
            f.block(1, |b| b.jump(3));
            f.block(2, |b| b.jump(3));
            f.block(3, |b| {
                b.op(load(v, object));
                b.ret_val(v);
            });
        });

        let mut helper = FieldValueHelper::new(
            &ssa,
            object,
            allocation(&ssa),
            field(),
            ConstValue::I32(0),
        );
        let load = read(&ssa);
        let value = helper.value_before(&mut ssa, load).unwrap();
        ssa.recompute_uses();

        // The default materialized after the allocation reaches both paths
        assert_eq!(ssa.constant(value), Some(&ConstValue::I32(0)));
        assert_eq!(ssa.phi_count(), 0);
        assert!(helper.phis_inserted().is_empty());
    }

    #[test]
    fn test_loop_phi_collapses() {
        let mut object = SsaVarId::new(0);
        let mut ssa = SsaFunctionBuilder::new(1).build_with(|f| {
            let cond = f.arg(0);
            object = f.var();
            let v = f.var();
            f.block(0, |b| {
                b.op(alloc(object));
                let seven = b.const_i32(7);
                b.store_field(object, field(), seven);
                b.jump(1);
            });
            f.block(1, |b| b.branch(cond, 2, 3));
            f.block(2, |b| b.jump(1));
            f.block(3, |b| {
                b.op(load(v, object));
                b.ret_val(v);
            });
        });

        let mut helper = FieldValueHelper::new(
            &ssa,
            object,
            allocation(&ssa),
            field(),
            ConstValue::I32(0),
        );
        let load = read(&ssa);
        let value = helper.value_before(&mut ssa, load).unwrap();

        assert_eq!(ssa.constant(value), Some(&ConstValue::I32(7)));
        assert_eq!(ssa.phi_count(), 0);
        assert!(helper.phis_inserted().is_empty());
    }

    #[test]
    fn test_finished_phi_collapses_with_the_phi_it_reads() {
        // B0 -> B1 -> B2 (self loop) -> B3 -> B1 | B4, read in B3
        let mut object = SsaVarId::new(0);
        let mut seven = SsaVarId::new(0);
        let mut ssa = SsaFunctionBuilder::new(1).build_with(|f| {
            let cond = f.arg(0);
            object = f.var();
            let v = f.var();
            f.block(0, |b| {
                b.op(alloc(object));
                seven = b.const_i32(7);
                b.store_field(object, field(), seven);
                b.jump(1);
            });
            f.block(1, |b| b.jump(2));
            f.block(2, |b| b.branch(cond, 2, 3));
            f.block(3, |b| {
                b.op(load(v, object));
                b.branch(cond, 1, 4);
            });
            f.block(4, |b| b.ret_val(v));
        });

        let mut helper = FieldValueHelper::new(
            &ssa,
            object,
            allocation(&ssa),
            field(),
            ConstValue::I32(0),
        );
        let load = read(&ssa);
        let value = helper.value_before(&mut ssa, load).unwrap();

        assert_eq!(value, seven);
        assert_eq!(ssa.phi_count(), 0);
        assert!(helper.phis_inserted().is_empty());
    }
}
