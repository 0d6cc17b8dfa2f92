//! Method summaries for interprocedural analysis.
//!
//! A [`MethodSummary`] condenses one method body into the facts other passes
//! consult without looking at the body again: its size, what it returns,
//! whether it has side effects, whether it is a trivial initializer, and for
//! every parameter a [`ParameterUsage`] describing what the body does with
//! the value passed in.
//!
//! Per-class and per-field facts derived from those summaries live here too:
//! [`ClassInitializerInfo`] classifies static initialization and
//! [`FieldFacts`] records the exact contents of singleton fields.

use std::collections::VecDeque;

use rustc_hash::FxHashSet;

use crate::{
    analysis::ssa::{
        CallKind, ConstValue, SsaFunction, SsaOp, SsaVarId, UseSite,
    },
    metadata::{
        program::{FieldFlags, MethodDef, MethodFlags, Program},
        token::Token,
    },
};

/// What a method returns.
#[derive(Debug, Clone, PartialEq)]
pub enum ReturnInfo {
    /// Always returns this constant.
    Constant(ConstValue),

    /// Returns argument N unchanged.
    PassThrough(usize),

    /// Returns a freshly allocated object.
    NewObject,

    /// Returns different values depending on state or input.
    Dynamic,

    /// Returns nothing.
    Void,

    /// Not analyzed.
    Unknown,
}

impl ReturnInfo {
    /// Returns `true` if the result is known at compile time.
    #[must_use]
    pub fn is_known(&self) -> bool {
        matches!(self, Self::Constant(_) | Self::Void)
    }
}

/// Side effect classification of a method body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodPurity {
    /// No side effects and no reads of mutable state.
    Pure,

    /// Reads fields but writes nothing.
    ReadOnly,

    /// Writes fields of its receiver only.
    LocalMutation,

    /// Writes global state, throws or synchronizes.
    Impure,

    /// Calls something or was not analyzed.
    Unknown,
}

impl MethodPurity {
    /// Returns `true` if a call whose result is unused can be deleted.
    #[must_use]
    pub fn can_eliminate_if_unused(&self) -> bool {
        matches!(self, Self::Pure | Self::ReadOnly)
    }
}

/// The accepted ways a body uses one of its parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageDetails {
    /// The parameter (or a copy of it) is returned.
    pub returned: bool,
    /// The parameter is compared against `null`.
    pub null_tested: bool,
    /// The parameter is used as a monitor.
    pub used_as_lock: bool,
    /// Fields read from the parameter.
    pub field_reads: Vec<Token>,
    /// Fields written on the parameter.
    pub field_writes: Vec<Token>,
    /// Calls made with the parameter as receiver.
    pub receiver_calls: Vec<(CallKind, Token)>,
}

impl UsageDetails {
    fn is_empty(&self) -> bool {
        !self.returned
            && !self.null_tested
            && !self.used_as_lock
            && self.field_reads.is_empty()
            && self.field_writes.is_empty()
            && self.receiver_calls.is_empty()
    }
}

/// What a method does with one parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterUsage {
    /// Never read.
    Unused,
    /// Read only in the ways [`UsageDetails`] can describe.
    Used(UsageDetails),
    /// Escapes or is used in a way the analysis does not model.
    Unknown,
}

/// Four-way view of a [`ParameterUsage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum UsageCategory {
    /// Never read.
    Unused,
    /// Returned to the caller.
    Returned,
    /// Only receives calls, field accesses, null tests and monitors.
    ReceiverOfCalls,
    /// Anything else.
    Unknown,
}

impl ParameterUsage {
    /// Returns the four-way classification.
    #[must_use]
    pub fn category(&self) -> UsageCategory {
        match self {
            Self::Unused => UsageCategory::Unused,
            Self::Used(details) if details.returned => UsageCategory::Returned,
            Self::Used(_) => UsageCategory::ReceiverOfCalls,
            Self::Unknown => UsageCategory::Unknown,
        }
    }

    /// Returns the details of a modeled usage.
    #[must_use]
    pub fn details(&self) -> Option<&UsageDetails> {
        match self {
            Self::Used(details) => Some(details),
            _ => None,
        }
    }

    /// Returns `true` unless the usage is [`ParameterUsage::Unknown`].
    #[must_use]
    pub fn is_modeled(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// A constructor or class initializer that only assigns known values.
#[derive(Debug, Clone, PartialEq)]
pub enum TrivialInitializer {
    /// Instance constructor storing constants into its receiver and
    /// optionally delegating to one other constructor.
    Instance {
        /// Constructor called on the receiver, if any.
        super_constructor: Option<Token>,
        /// `(field, value)` pairs stored on the receiver.
        constant_stores: Vec<(Token, ConstValue)>,
    },
    /// Class initializer that only assigns static fields of its own class.
    Class {
        /// Static fields assigned, each exactly once.
        assigned_fields: Vec<Token>,
    },
}

/// Summary of a method's behavior.
#[derive(Debug, Clone)]
pub struct MethodSummary {
    /// The method.
    pub token: Token,
    /// Non-`Nop` instruction count, the cost of inlining it.
    pub estimated_size: usize,
    /// What it returns.
    pub return_info: ReturnInfo,
    /// Every return hands back argument 0 of an instance method.
    pub returns_receiver: bool,
    /// Side effects.
    pub purity: MethodPurity,
    /// One entry per SSA argument, receiver first.
    pub parameters: Vec<ParameterUsage>,
    /// Set when the body is a trivial initializer.
    pub trivial_initializer: Option<TrivialInitializer>,
    /// The body calls the method itself.
    pub is_recursive: bool,
}

impl MethodSummary {
    /// Summary for a method without an analyzable body.
    #[must_use]
    pub fn unknown(token: Token, arg_count: usize) -> Self {
        Self {
            token,
            estimated_size: usize::MAX,
            return_info: ReturnInfo::Unknown,
            returns_receiver: false,
            purity: MethodPurity::Unknown,
            parameters: vec![ParameterUsage::Unknown; arg_count],
            trivial_initializer: None,
            is_recursive: false,
        }
    }

    /// Analyzes `body`, the body of `def`.
    #[must_use]
    pub fn compute(def: &MethodDef, body: &SsaFunction) -> Self {
        let return_info = analyze_returns(body);
        let returns_receiver =
            !def.is_static() && matches!(return_info, ReturnInfo::PassThrough(0));

        let parameters = (0..body.num_args())
            .map(|index| analyze_parameter(body, index))
            .collect();

        let is_recursive = body.iter_instructions().any(|(_, _, instr)| {
            matches!(instr.op(), SsaOp::Call { method, .. } if method.token() == def.token)
        });

        let trivial_initializer = if def.flags.contains(MethodFlags::CONSTRUCTOR) {
            trivial_instance_initializer(body)
        } else if def.flags.contains(MethodFlags::CLASS_INITIALIZER) {
            trivial_class_initializer(def.owner, body)
        } else {
            None
        };

        Self {
            token: def.token,
            estimated_size: body.instruction_count(),
            return_info,
            returns_receiver,
            purity: analyze_purity(def, body),
            parameters,
            trivial_initializer,
            is_recursive,
        }
    }

    /// Returns the usage of SSA argument `index`.
    #[must_use]
    pub fn parameter(&self, index: usize) -> &ParameterUsage {
        self.parameters
            .get(index)
            .unwrap_or(&ParameterUsage::Unknown)
    }

    /// Returns the constant this method always returns.
    #[must_use]
    pub fn returns_constant(&self) -> Option<&ConstValue> {
        match &self.return_info {
            ReturnInfo::Constant(v) => Some(v),
            _ => None,
        }
    }
}

/// Follows `start` through copies and casts, calling `visit` for every
/// other use. Returns `false` as soon as `visit` does, or a phi reads a copy.
fn walk_copies<F>(ssa: &SsaFunction, start: SsaVarId, mut visit: F) -> bool
where
    F: FnMut(SsaVarId, &SsaOp) -> bool,
{
    let mut seen = FxHashSet::default();
    let mut queue = VecDeque::from([start]);
    while let Some(var) = queue.pop_front() {
        if !seen.insert(var) {
            continue;
        }
        for site in ssa.uses_of(var) {
            let UseSite {
                block,
                index,
                is_phi_operand,
            } = *site;
            if is_phi_operand {
                return false;
            }
            let Some(instr) = ssa.block(block).and_then(|b| b.instruction(index)) else {
                continue;
            };
            match instr.op() {
                SsaOp::Copy { dest, src } if *src == var => queue.push_back(*dest),
                SsaOp::CastClass { dest, object, .. } if *object == var => {
                    queue.push_back(*dest);
                }
                op => {
                    if !visit(var, op) {
                        return false;
                    }
                }
            }
        }
    }
    true
}

/// Classifies how `ssa` uses argument `index`.
#[must_use]
pub fn analyze_parameter(ssa: &SsaFunction, index: usize) -> ParameterUsage {
    let Some(param) = ssa.argument(index) else {
        return ParameterUsage::Unknown;
    };

    let mut details = UsageDetails::default();
    let modeled = walk_copies(ssa, param, |var, op| match op {
        SsaOp::BranchNull { .. } => {
            details.null_tested = true;
            true
        }
        SsaOp::LoadField { field, .. } => {
            details.field_reads.push(field.token());
            true
        }
        SsaOp::StoreField { object, field, value } => {
            if *object == var && *value != var {
                details.field_writes.push(field.token());
                true
            } else {
                false
            }
        }
        SsaOp::Call {
            kind, method, args, ..
        } => {
            let receiver_only = kind.has_receiver()
                && args.first() == Some(&var)
                && !args[1..].contains(&var);
            if receiver_only {
                details.receiver_calls.push((*kind, method.token()));
            }
            receiver_only
        }
        SsaOp::MonitorEnter { .. } | SsaOp::MonitorExit { .. } => {
            details.used_as_lock = true;
            true
        }
        SsaOp::Return { .. } => {
            details.returned = true;
            true
        }
        _ => false,
    });

    if !modeled {
        ParameterUsage::Unknown
    } else if details.is_empty() {
        ParameterUsage::Unused
    } else {
        ParameterUsage::Used(details)
    }
}

fn resolve_copies(ssa: &SsaFunction, mut var: SsaVarId) -> SsaVarId {
    for _ in 0..ssa.variable_count() {
        match ssa.defining_op(var) {
            Some(SsaOp::Copy { src, .. }) => var = *src,
            _ => break,
        }
    }
    var
}

fn analyze_returns(ssa: &SsaFunction) -> ReturnInfo {
    let values: Vec<Option<SsaVarId>> = ssa
        .iter_instructions()
        .filter_map(|(_, _, instr)| match instr.op() {
            SsaOp::Return { value } => Some(value.map(|v| resolve_copies(ssa, v))),
            _ => None,
        })
        .collect();

    if values.is_empty() {
        return ReturnInfo::Dynamic;
    }
    if values.iter().all(Option::is_none) {
        return ReturnInfo::Void;
    }
    let Some(returned): Option<Vec<SsaVarId>> = values.into_iter().collect() else {
        return ReturnInfo::Dynamic;
    };

    if let Some(index) = ssa.arguments().iter().position(|a| *a == returned[0]) {
        if returned.iter().all(|v| *v == returned[0]) {
            return ReturnInfo::PassThrough(index);
        }
    }

    let constants: Option<Vec<&ConstValue>> =
        returned.iter().map(|v| ssa.constant(*v)).collect();
    if let Some(constants) = constants {
        if constants.iter().all(|c| *c == constants[0]) {
            return ReturnInfo::Constant(constants[0].clone());
        }
    }

    if returned
        .iter()
        .all(|v| matches!(ssa.defining_op(*v), Some(SsaOp::NewInstance { .. })))
    {
        return ReturnInfo::NewObject;
    }

    ReturnInfo::Dynamic
}

fn analyze_purity(def: &MethodDef, ssa: &SsaFunction) -> MethodPurity {
    let receiver = if def.is_static() {
        None
    } else {
        ssa.argument(0)
    };

    let mut purity = MethodPurity::Pure;
    for (_, _, instr) in ssa.iter_instructions() {
        let step = match instr.op() {
            SsaOp::LoadField { .. } | SsaOp::LoadStaticField { .. } => MethodPurity::ReadOnly,
            SsaOp::StoreField { object, .. } if Some(resolve_copies(ssa, *object)) == receiver => {
                MethodPurity::LocalMutation
            }
            SsaOp::StoreField { .. }
            | SsaOp::StoreStaticField { .. }
            | SsaOp::Throw { .. }
            | SsaOp::MonitorEnter { .. }
            | SsaOp::MonitorExit { .. }
            | SsaOp::NewInstance { .. }
            | SsaOp::CastClass { .. } => MethodPurity::Impure,
            SsaOp::Call { .. } => return MethodPurity::Unknown,
            _ => MethodPurity::Pure,
        };
        purity = match (purity, step) {
            (MethodPurity::Impure, _) | (_, MethodPurity::Impure) => MethodPurity::Impure,
            (MethodPurity::LocalMutation, _) | (_, MethodPurity::LocalMutation) => {
                MethodPurity::LocalMutation
            }
            (MethodPurity::ReadOnly, _) | (_, MethodPurity::ReadOnly) => MethodPurity::ReadOnly,
            _ => MethodPurity::Pure,
        };
    }
    purity
}

fn trivial_instance_initializer(ssa: &SsaFunction) -> Option<TrivialInitializer> {
    let this = ssa.argument(0)?;
    let mut super_constructor = None;
    let mut constant_stores = Vec::new();

    for (_, _, instr) in ssa.iter_instructions() {
        match instr.op() {
            SsaOp::Nop
            | SsaOp::Const { .. }
            | SsaOp::Jump { .. }
            | SsaOp::Return { value: None } => {}
            SsaOp::StoreField {
                object,
                field,
                value,
            } if *object == this => {
                let constant = ssa.constant(*value)?;
                constant_stores.push((field.token(), constant.clone()));
            }
            SsaOp::Call {
                kind: CallKind::Direct,
                method,
                args,
                dest: None,
            } if args.as_slice() == [this] && super_constructor.is_none() => {
                super_constructor = Some(method.token());
            }
            _ => return None,
        }
    }

    Some(TrivialInitializer::Instance {
        super_constructor,
        constant_stores,
    })
}

fn trivial_class_initializer(owner: Token, ssa: &SsaFunction) -> Option<TrivialInitializer> {
    let mut assigned_fields: Vec<Token> = Vec::new();
    for (_, _, instr) in ssa.iter_instructions() {
        match instr.op() {
            SsaOp::Nop
            | SsaOp::Const { .. }
            | SsaOp::Copy { .. }
            | SsaOp::Jump { .. }
            | SsaOp::Return { value: None } => {}
            SsaOp::NewInstance { class, .. } if class.token() == owner => {}
            // Constructor calls are checked against their own summaries later
            SsaOp::Call {
                kind: CallKind::Direct,
                dest: None,
                ..
            } => {}
            SsaOp::StoreStaticField { field, .. } => {
                if assigned_fields.contains(&field.token()) {
                    return None;
                }
                assigned_fields.push(field.token());
            }
            _ => return None,
        }
    }
    Some(TrivialInitializer::Class { assigned_fields })
}

/// Observable effects of a class's static initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassInitializerInfo {
    /// The class has no static initializer.
    None,
    /// The initializer only assigns the listed static fields of its class.
    Trivial {
        /// Static fields assigned, each exactly once.
        assigned_fields: Vec<Token>,
    },
    /// The initializer may have observable side effects.
    SideEffects,
}

impl ClassInitializerInfo {
    /// Classifies the static initializer of `class`.
    ///
    /// `summary_of` supplies summaries of the constructors the initializer
    /// calls; each must be a trivial instance initializer whose chain ends
    /// in the root constructor.
    pub fn compute<F>(program: &Program, class: Token, summary_of: F) -> Self
    where
        F: Fn(Token) -> Option<MethodSummary>,
    {
        let Some(clinit) = program.class_initializer_of(class) else {
            return Self::None;
        };
        let Some(summary) = summary_of(clinit) else {
            return Self::SideEffects;
        };
        let Some(TrivialInitializer::Class { assigned_fields }) = summary.trivial_initializer
        else {
            return Self::SideEffects;
        };

        let own_fields = assigned_fields.iter().all(|&f| {
            program
                .field(f)
                .is_some_and(|def| def.owner == class && def.is_static())
        });
        if !own_fields {
            return Self::SideEffects;
        }

        let body = program.method(clinit).and_then(|m| m.body.as_ref());
        let calls_trivial = body.is_some_and(|ssa| {
            ssa.iter_instructions().all(|(_, _, instr)| match instr.op() {
                SsaOp::Call { method, .. } => {
                    constructor_chain_state(program, method.token(), &summary_of).is_some()
                }
                _ => true,
            })
        });
        if !calls_trivial {
            return Self::SideEffects;
        }

        Self::Trivial { assigned_fields }
    }

    /// Returns `true` if running the initializer may be observed.
    #[must_use]
    pub fn has_side_effects(&self) -> bool {
        matches!(self, Self::SideEffects)
    }
}

/// Follows a chain of trivial constructors down to the root constructor,
/// collecting the constant stores. Stores made later in the chain (closer to
/// the constructor called first) win.
fn constructor_chain_state<F>(
    program: &Program,
    ctor: Token,
    summary_of: &F,
) -> Option<Vec<(Token, ConstValue)>>
where
    F: Fn(Token) -> Option<MethodSummary>,
{
    let mut chain = Vec::new();
    let mut current = Some(ctor);
    while let Some(token) = current {
        if token == program.root_constructor() {
            break;
        }
        if chain.len() > program.methods().count() {
            return None;
        }
        let def = program.method(token)?;
        if !def.is_constructor() {
            return None;
        }
        match summary_of(token)?.trivial_initializer? {
            TrivialInitializer::Instance {
                super_constructor,
                constant_stores,
            } => {
                chain.push(constant_stores);
                current = super_constructor;
            }
            TrivialInitializer::Class { .. } => return None,
        }
        if current.is_none() {
            // Every constructor chain must end in the root constructor
            return None;
        }
    }

    let mut state: Vec<(Token, ConstValue)> = Vec::new();
    for stores in chain.into_iter().rev() {
        for (field, value) in stores {
            match state.iter_mut().find(|(f, _)| *f == field) {
                Some(slot) => slot.1 = value,
                None => state.push((field, value)),
            }
        }
    }
    Some(state)
}

/// Whole-program facts about a static field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFacts {
    /// Exact runtime class of the (non-null) instance the field holds.
    pub exact_type: Option<Token>,
    /// Known value of every instance field of that instance.
    pub object_state: Vec<(Token, ConstValue)>,
}

impl FieldFacts {
    /// Returns the recorded value of instance field `field`.
    #[must_use]
    pub fn value_of(&self, field: Token) -> Option<&ConstValue> {
        self.object_state
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, v)| v)
    }

    /// Derives the facts of a static final field assigned exactly once by a
    /// trivial class initializer, from `new C(); C.<init>(...)` with a trivial
    /// constructor chain.
    pub fn derive<F>(program: &Program, field: Token, summary_of: F) -> Option<Self>
    where
        F: Fn(Token) -> Option<MethodSummary>,
    {
        let def = program.field(field)?;
        if !def.flags.contains(FieldFlags::STATIC | FieldFlags::FINAL) {
            return None;
        }
        let clinit = program.class_initializer_of(def.owner)?;
        let body = program.method(clinit)?.body.as_ref()?;

        let stored = body.iter_instructions().find_map(|(_, _, instr)| match instr.op() {
            SsaOp::StoreStaticField { field: f, value } if f.token() == field => Some(*value),
            _ => None,
        })?;
        let stored = resolve_copies(body, stored);
        let Some(SsaOp::NewInstance { class, .. }) = body.defining_op(stored) else {
            return None;
        };
        let class = class.token();

        // Exactly one constructor call on the instance, with no other arguments
        let mut ctor_calls = body.iter_instructions().filter_map(|(_, _, instr)| {
            match instr.op() {
                SsaOp::Call {
                    kind: CallKind::Direct,
                    method,
                    args,
                    ..
                } if args.first().map(|a| resolve_copies(body, *a)) == Some(stored) => {
                    Some((method.token(), args.len()))
                }
                _ => None,
            }
        });
        let (ctor, arg_count) = ctor_calls.next()?;
        if ctor_calls.next().is_some() || arg_count != 1 {
            return None;
        }

        let stores = constructor_chain_state(program, ctor, &summary_of)?;
        let object_state = program
            .instance_fields(class)
            .into_iter()
            .filter_map(|f| {
                let ty = program.field(f)?.value_type;
                let value = stores
                    .iter()
                    .find(|(s, _)| *s == f)
                    .map_or_else(|| ConstValue::default_for(ty), |(_, v)| v.clone());
                Some((f, value))
            })
            .collect();

        Some(Self {
            exact_type: Some(class),
            object_state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::ssa::{NullTest, SsaFunctionBuilder, ValueType},
        metadata::program::{ClassFlags, MethodFlags},
    };

    fn method_def(token: Token, flags: MethodFlags, params: usize) -> MethodDef {
        MethodDef {
            token,
            name: "m".to_string(),
            owner: Token::type_def(2),
            flags,
            param_count: params,
            body: None,
        }
    }

    #[test]
    fn test_parameter_usage_categories() {
        let field = Token::field(1);
        let getter = Token::method(5);
        let ssa = SsaFunctionBuilder::new(4).build_with(|f| {
            let (this, other, unused, escaping) = (f.arg(0), f.arg(1), f.arg(2), f.arg(3));
            f.block(0, |b| {
                let copy = b.copy(this);
                b.load_field(copy, field);
                b.call_void(CallKind::Virtual, getter, &[this]);
                b.store_static(Token::field(2), escaping);
                b.branch_null(other, NullTest::IsNull, 1, 2);
            });
            f.block(1, |b| b.ret_val(other));
            f.block(2, |b| b.ret_val(other));
            let _ = unused;
        });

        let this = analyze_parameter(&ssa, 0);
        assert_eq!(this.category(), UsageCategory::ReceiverOfCalls);
        let details = this.details().unwrap();
        assert_eq!(details.field_reads, vec![field]);
        assert_eq!(details.receiver_calls, vec![(CallKind::Virtual, getter)]);

        let other = analyze_parameter(&ssa, 1);
        assert_eq!(other.category(), UsageCategory::Returned);
        assert!(other.details().unwrap().null_tested);

        assert_eq!(analyze_parameter(&ssa, 2), ParameterUsage::Unused);
        assert_eq!(analyze_parameter(&ssa, 3), ParameterUsage::Unknown);
        assert_eq!(analyze_parameter(&ssa, 4), ParameterUsage::Unknown);
    }

    #[test]
    fn test_storing_parameter_as_value_is_unknown() {
        let ssa = SsaFunctionBuilder::new(2).build_with(|f| {
            let (this, value) = (f.arg(0), f.arg(1));
            f.block(0, |b| {
                b.store_field(this, Token::field(1), value);
                b.store_field(this, Token::field(1), this);
                b.ret();
            });
        });
        assert_eq!(analyze_parameter(&ssa, 0), ParameterUsage::Unknown);
        assert_eq!(analyze_parameter(&ssa, 1), ParameterUsage::Unknown);
    }

    #[test]
    fn test_returns_receiver_and_constant() {
        let fluent = SsaFunctionBuilder::new(1).build_with(|f| {
            let this = f.arg(0);
            f.block(0, |b| {
                let copy = b.copy(this);
                b.ret_val(copy);
            });
        });
        let summary = MethodSummary::compute(
            &method_def(Token::method(3), MethodFlags::empty(), 0),
            &fluent,
        );
        assert!(summary.returns_receiver);
        assert_eq!(summary.purity, MethodPurity::Pure);

        let constant = SsaFunctionBuilder::new(1).build_with(|f| {
            f.block(0, |b| {
                let seven = b.const_i32(7);
                b.ret_val(seven);
            });
        });
        let summary = MethodSummary::compute(
            &method_def(Token::method(4), MethodFlags::empty(), 0),
            &constant,
        );
        assert_eq!(summary.returns_constant(), Some(&ConstValue::I32(7)));
        assert!(!summary.returns_receiver);
        assert_eq!(summary.estimated_size, 2);
    }

    #[test]
    fn test_trivial_instance_initializer() {
        let ctor = SsaFunctionBuilder::new(1).build_with(|f| {
            let this = f.arg(0);
            f.block(0, |b| {
                b.call_void(CallKind::Direct, Token::method(1), &[this]);
                let one = b.const_i32(1);
                b.store_field(this, Token::field(1), one);
                b.ret();
            });
        });
        let summary = MethodSummary::compute(
            &method_def(Token::method(2), MethodFlags::CONSTRUCTOR, 0),
            &ctor,
        );
        assert_eq!(
            summary.trivial_initializer,
            Some(TrivialInitializer::Instance {
                super_constructor: Some(Token::method(1)),
                constant_stores: vec![(Token::field(1), ConstValue::I32(1))],
            })
        );
        assert_eq!(summary.purity, MethodPurity::Unknown);
    }

    #[test]
    fn test_field_facts_for_singleton() {
        let mut program = Program::new();
        let holder = program.add_class("Holder", ClassFlags::FINAL, None);
        let instance = program
            .add_field(
                holder,
                "INSTANCE",
                FieldFlags::STATIC | FieldFlags::FINAL,
                ValueType::Reference,
            )
            .unwrap();
        let ctor = program
            .add_method(holder, "<init>", MethodFlags::CONSTRUCTOR, 0)
            .unwrap();
        let clinit = program
            .add_method(
                holder,
                "<clinit>",
                MethodFlags::STATIC | MethodFlags::CLASS_INITIALIZER,
                0,
            )
            .unwrap();
        let root = program.root_constructor();
        program
            .set_body(
                ctor,
                SsaFunctionBuilder::new(1).build_with(|f| {
                    let this = f.arg(0);
                    f.block(0, |b| {
                        b.call_void(CallKind::Direct, root, &[this]);
                        b.ret();
                    });
                }),
            )
            .unwrap();
        program
            .set_body(
                clinit,
                SsaFunctionBuilder::new(0).build_with(|f| {
                    f.block(0, |b| {
                        let obj = b.new_object(holder, ctor, &[]);
                        b.store_static(instance, obj);
                        b.ret();
                    });
                }),
            )
            .unwrap();

        let summary_of = |m: Token| {
            let def = program.method(m)?;
            Some(MethodSummary::compute(def, def.body.as_ref()?))
        };
        assert_eq!(
            ClassInitializerInfo::compute(&program, holder, summary_of),
            ClassInitializerInfo::Trivial {
                assigned_fields: vec![instance]
            }
        );

        let facts = FieldFacts::derive(&program, instance, summary_of).unwrap();
        assert_eq!(facts.exact_type, Some(holder));
        assert!(facts.object_state.is_empty());
    }
}
