//! Builder pattern for programmatic SSA construction.
//!
//! The closure-based API lets a whole function be written as one expression,
//! with the CFG shape visible at a glance. It is how tests, benchmarks and
//! callers that synthesize method bodies construct IR:
//!
//! ```rust
//! use dotinline::analysis::ssa::SsaFunctionBuilder;
//!
//! let ssa = SsaFunctionBuilder::new(1).build_with(|f| {
//!     let cond = f.arg(0);
//!
//!     f.block(0, |b| b.branch(cond, 1, 2));
//!     f.block(1, |b| b.jump(3));
//!     f.block(2, |b| b.jump(3));
//!     f.block(3, |b| b.ret());
//! });
//! assert_eq!(ssa.block_count(), 4);
//! ```
//!
//! # Variable Management
//!
//! Operations that produce a value allocate its variable and return it.
//! Variables needed before their definition, such as phi results referenced
//! around a loop, are reserved up front with [`SsaFunctionContext::var`].
//! Block ids may be declared in any order; gaps become empty blocks.

use std::collections::BTreeMap;

use crate::{
    analysis::ssa::{
        CallKind, ConstValue, FieldRef, MethodRef, NullTest, PhiNode, PhiOperand, SsaBlock,
        SsaFunction, SsaInstruction, SsaOp, SsaVarId, TypeRef, VariableOrigin,
    },
    metadata::token::Token,
};

/// Builder for constructing SSA functions programmatically.
#[derive(Debug)]
pub struct SsaFunctionBuilder {
    func: SsaFunction,
}

impl SsaFunctionBuilder {
    /// Creates a builder for a function taking `num_args` arguments.
    #[must_use]
    pub fn new(num_args: usize) -> Self {
        Self {
            func: SsaFunction::new(num_args),
        }
    }

    /// Runs `f` to populate the blocks and returns the finished function.
    ///
    /// Instructions are numbered and def/use information is computed before
    /// the function is returned.
    pub fn build_with<F>(self, f: F) -> SsaFunction
    where
        F: FnOnce(&mut SsaFunctionContext<'_>),
    {
        let mut func = self.func;
        let mut blocks = BTreeMap::new();
        let mut next_stack = 0;
        {
            let mut ctx = SsaFunctionContext {
                func: &mut func,
                blocks: &mut blocks,
                next_stack: &mut next_stack,
            };
            f(&mut ctx);
        }

        let count = blocks.keys().next_back().map_or(0, |max| max + 1);
        for id in 0..count {
            let block = blocks.remove(&id).unwrap_or_else(|| SsaBlock::new(id));
            func.add_block(block);
        }
        func.recompute_uses();
        func
    }
}

/// Function-level context handed to [`SsaFunctionBuilder::build_with`].
pub struct SsaFunctionContext<'a> {
    func: &'a mut SsaFunction,
    blocks: &'a mut BTreeMap<usize, SsaBlock>,
    next_stack: &'a mut u32,
}

impl SsaFunctionContext<'_> {
    /// Returns the variable of argument `index`.
    ///
    /// # Panics
    ///
    /// Panics if the builder was created with fewer arguments.
    #[must_use]
    pub fn arg(&self, index: usize) -> SsaVarId {
        match self.func.argument(index) {
            Some(var) => var,
            None => panic!("argument {index} out of range"),
        }
    }

    /// Reserves a variable to be defined later, typically by a phi.
    pub fn var(&mut self) -> SsaVarId {
        let slot = *self.next_stack;
        *self.next_stack += 1;
        self.func.new_variable(VariableOrigin::Stack(slot))
    }

    /// Defines (or extends) block `id`.
    pub fn block<F>(&mut self, id: usize, f: F)
    where
        F: FnOnce(&mut SsaBlockBuilder<'_>),
    {
        let mut block = self.blocks.remove(&id).unwrap_or_else(|| SsaBlock::new(id));
        {
            let mut builder = SsaBlockBuilder {
                func: self.func,
                next_stack: self.next_stack,
                block: &mut block,
            };
            f(&mut builder);
        }
        self.blocks.insert(id, block);
    }
}

/// Block-level builder; each method appends one instruction or phi.
pub struct SsaBlockBuilder<'a> {
    func: &'a mut SsaFunction,
    next_stack: &'a mut u32,
    block: &'a mut SsaBlock,
}

impl SsaBlockBuilder<'_> {
    fn fresh(&mut self) -> SsaVarId {
        let slot = *self.next_stack;
        *self.next_stack += 1;
        self.func.new_variable(VariableOrigin::Stack(slot))
    }

    fn push(&mut self, op: SsaOp) {
        self.block.add_instruction(SsaInstruction::synthetic(op));
    }

    fn define<F>(&mut self, make: F) -> SsaVarId
    where
        F: FnOnce(SsaVarId) -> SsaOp,
    {
        let dest = self.fresh();
        self.push(make(dest));
        dest
    }

    /// `dest = value`
    pub fn const_val(&mut self, value: ConstValue) -> SsaVarId {
        self.define(|dest| SsaOp::Const { dest, value })
    }

    /// `dest = <i32>`
    pub fn const_i32(&mut self, value: i32) -> SsaVarId {
        self.const_val(ConstValue::I32(value))
    }

    /// `dest = <i64>`
    pub fn const_i64(&mut self, value: i64) -> SsaVarId {
        self.const_val(ConstValue::I64(value))
    }

    /// `dest = <bool>`
    pub fn const_bool(&mut self, value: bool) -> SsaVarId {
        self.const_val(ConstValue::Bool(value))
    }

    /// `dest = null`
    pub fn const_null(&mut self) -> SsaVarId {
        self.const_val(ConstValue::Null)
    }

    /// `dest = "<value>"`
    pub fn const_str(&mut self, value: &str) -> SsaVarId {
        self.const_val(ConstValue::Str(value.to_string()))
    }

    /// `dest = src`
    pub fn copy(&mut self, src: SsaVarId) -> SsaVarId {
        self.define(|dest| SsaOp::Copy { dest, src })
    }

    /// `dest = left + right`
    pub fn add(&mut self, left: SsaVarId, right: SsaVarId) -> SsaVarId {
        self.define(|dest| SsaOp::Add { dest, left, right })
    }

    /// `dest = left - right`
    pub fn sub(&mut self, left: SsaVarId, right: SsaVarId) -> SsaVarId {
        self.define(|dest| SsaOp::Sub { dest, left, right })
    }

    /// `dest = left * right`
    pub fn mul(&mut self, left: SsaVarId, right: SsaVarId) -> SsaVarId {
        self.define(|dest| SsaOp::Mul { dest, left, right })
    }

    /// `dest = left == right`
    pub fn ceq(&mut self, left: SsaVarId, right: SsaVarId) -> SsaVarId {
        self.define(|dest| SsaOp::Ceq { dest, left, right })
    }

    /// `dest = left < right`
    pub fn clt(&mut self, left: SsaVarId, right: SsaVarId) -> SsaVarId {
        self.define(|dest| SsaOp::Clt { dest, left, right })
    }

    /// `dest = new <class>` without running a constructor.
    pub fn new_instance(&mut self, class: Token) -> SsaVarId {
        self.define(|dest| SsaOp::NewInstance {
            dest,
            class: TypeRef::new(class),
        })
    }

    /// `dest = object.field`
    pub fn load_field(&mut self, object: SsaVarId, field: Token) -> SsaVarId {
        self.define(|dest| SsaOp::LoadField {
            dest,
            object,
            field: FieldRef::new(field),
        })
    }

    /// `object.field = value`
    pub fn store_field(&mut self, object: SsaVarId, field: Token, value: SsaVarId) {
        self.push(SsaOp::StoreField {
            object,
            field: FieldRef::new(field),
            value,
        });
    }

    /// `dest = static field`
    pub fn load_static(&mut self, field: Token) -> SsaVarId {
        self.define(|dest| SsaOp::LoadStaticField {
            dest,
            field: FieldRef::new(field),
        })
    }

    /// `static field = value`
    pub fn store_static(&mut self, field: Token, value: SsaVarId) {
        self.push(SsaOp::StoreStaticField {
            field: FieldRef::new(field),
            value,
        });
    }

    /// `dest = (target) object`
    pub fn cast(&mut self, object: SsaVarId, target: Token) -> SsaVarId {
        self.define(|dest| SsaOp::CastClass {
            dest,
            object,
            target_type: TypeRef::new(target),
        })
    }

    /// `dest = object instanceof target`
    pub fn instance_of(&mut self, object: SsaVarId, target: Token) -> SsaVarId {
        self.define(|dest| SsaOp::InstanceOf {
            dest,
            object,
            target_type: TypeRef::new(target),
        })
    }

    /// Call whose result is kept.
    pub fn call(&mut self, kind: CallKind, method: Token, args: &[SsaVarId]) -> SsaVarId {
        self.define(|dest| SsaOp::Call {
            dest: Some(dest),
            kind,
            method: MethodRef::new(method),
            args: args.to_vec(),
        })
    }

    /// Call without a result.
    pub fn call_void(&mut self, kind: CallKind, method: Token, args: &[SsaVarId]) {
        self.push(SsaOp::Call {
            dest: None,
            kind,
            method: MethodRef::new(method),
            args: args.to_vec(),
        });
    }

    /// `new class` followed by a direct call of `ctor` with the instance as receiver.
    pub fn new_object(&mut self, class: Token, ctor: Token, args: &[SsaVarId]) -> SsaVarId {
        let instance = self.new_instance(class);
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(instance);
        full.extend_from_slice(args);
        self.call_void(CallKind::Direct, ctor, &full);
        instance
    }

    /// `monitor-enter object`
    pub fn monitor_enter(&mut self, object: SsaVarId) {
        self.push(SsaOp::MonitorEnter { object });
    }

    /// `monitor-exit object`
    pub fn monitor_exit(&mut self, object: SsaVarId) {
        self.push(SsaOp::MonitorExit { object });
    }

    /// Unconditional jump.
    pub fn jump(&mut self, target: usize) {
        self.push(SsaOp::Jump { target });
    }

    /// Conditional branch on a boolean.
    pub fn branch(&mut self, condition: SsaVarId, true_target: usize, false_target: usize) {
        self.push(SsaOp::Branch {
            condition,
            true_target,
            false_target,
        });
    }

    /// Branch on `value == null` (or `!=` for [`NullTest::NotNull`]).
    pub fn branch_null(
        &mut self,
        value: SsaVarId,
        test: NullTest,
        true_target: usize,
        false_target: usize,
    ) {
        self.push(SsaOp::BranchNull {
            value,
            test,
            true_target,
            false_target,
        });
    }

    /// `ret`
    pub fn ret(&mut self) {
        self.push(SsaOp::Return { value: None });
    }

    /// `ret value`
    pub fn ret_val(&mut self, value: SsaVarId) {
        self.push(SsaOp::Return { value: Some(value) });
    }

    /// `throw exception`
    pub fn throw(&mut self, exception: SsaVarId) {
        self.push(SsaOp::Throw { exception });
    }

    /// Adds `dest = phi(...)` from `(predecessor, value)` pairs.
    pub fn phi(&mut self, dest: SsaVarId, operands: &[(usize, SsaVarId)]) {
        let mut phi = PhiNode::new(dest, VariableOrigin::Phi);
        for &(pred, value) in operands {
            phi.add_operand(PhiOperand::new(value, pred));
        }
        self.block.add_phi(phi);
    }

    /// Appends an arbitrary operation.
    pub fn op(&mut self, op: SsaOp) {
        self.push(op);
    }

    /// Appends a `Nop`.
    pub fn nop(&mut self) {
        self.push(SsaOp::Nop);
    }
}
