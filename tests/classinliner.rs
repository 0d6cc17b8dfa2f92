//! Class inlining integration tests.
//!
//! Every test builds a small program with the public builder API, runs the
//! pipeline (or the pass directly) and inspects the optimized body:
//! 1. Declare classes, fields and methods on a `Program`
//! 2. Give each method an SSA body with `SsaFunctionBuilder`
//! 3. Compile, or run `ClassInliningPass` on one method
//! 4. Check which operations survived and which events were recorded

use std::sync::Arc;

use dotinline::prelude::*;

/// Count the live instructions of `ssa` matching `pred`.
fn count_ops(ssa: &SsaFunction, pred: impl Fn(&SsaOp) -> bool) -> usize {
    ssa.iter_instructions()
        .filter(|(_, _, instr)| pred(instr.op()))
        .count()
}

/// The value of the first `Return` carrying one.
fn returned_value(ssa: &SsaFunction) -> Option<SsaVarId> {
    ssa.iter_instructions().find_map(|(_, _, instr)| match instr.op() {
        SsaOp::Return { value } => *value,
        _ => None,
    })
}

fn allocations(ssa: &SsaFunction) -> usize {
    count_ops(ssa, |op| matches!(op, SsaOp::NewInstance { .. }))
}

fn field_accesses(ssa: &SsaFunction) -> usize {
    count_ops(ssa, |op| {
        matches!(op, SsaOp::LoadField { .. } | SsaOp::StoreField { .. })
    })
}

/// `Point { x, y }` with `Point(x, y)` storing both arguments.
struct Points {
    program: Program,
    point: Token,
    x: Token,
    y: Token,
    ctor: Token,
    main: Token,
}

fn points() -> Result<Points> {
    let mut program = Program::new();
    let object_ctor = program.root_constructor();
    let point = program.add_class("Point", ClassFlags::empty(), None);
    let x = program.add_field(point, "x", FieldFlags::empty(), ValueType::Int)?;
    let y = program.add_field(point, "y", FieldFlags::empty(), ValueType::Int)?;
    let ctor = program.add_method(point, ".ctor", MethodFlags::CONSTRUCTOR, 2)?;
    program.set_body(
        ctor,
        SsaFunctionBuilder::new(3).build_with(|f| {
            let (this, vx, vy) = (f.arg(0), f.arg(1), f.arg(2));
            f.block(0, |b| {
                b.call_void(CallKind::Direct, object_ctor, &[this]);
                b.store_field(this, x, vx);
                b.store_field(this, y, vy);
                b.ret();
            });
        }),
    )?;
    let main = program.add_class("Main", ClassFlags::empty(), None);
    Ok(Points {
        program,
        point,
        x,
        y,
        ctor,
        main,
    })
}

#[test]
fn test_point_fields_become_values() -> Result<()> {
    let mut fx = points()?;
    let (point, ctor, x, y) = (fx.point, fx.ctor, fx.x, fx.y);
    let run = fx.program.add_method(fx.main, "run", MethodFlags::STATIC, 2)?;
    fx.program.set_body(
        run,
        SsaFunctionBuilder::new(2).build_with(|f| {
            let (a, c) = (f.arg(0), f.arg(1));
            f.block(0, |b| {
                let p = b.new_object(point, ctor, &[a, c]);
                let vx = b.load_field(p, x);
                let vy = b.load_field(p, y);
                let sum = b.add(vx, vy);
                b.ret_val(sum);
            });
        }),
    )?;

    let program = Arc::new(fx.program);
    let result = Compiler::default().compile(&program)?;
    let body = result.body(run).expect("run has a body");

    assert_eq!(allocations(&body), 0);
    assert_eq!(field_accesses(&body), 0);
    assert_eq!(count_ops(&body, |op| matches!(op, SsaOp::Call { .. })), 0);

    let ret = returned_value(&body).expect("run returns a value");
    match body.defining_op(ret) {
        Some(SsaOp::Add { left, right, .. }) => {
            assert_eq!(Some(*left), body.argument(0));
            assert_eq!(Some(*right), body.argument(1));
        }
        other => panic!("expected an add of both arguments, found {other:?}"),
    }

    let stats = result.stats();
    assert_eq!(stats.classes_inlined, 1);
    assert_eq!(stats.field_reads_replaced, 2);
    assert!(result.context().was_inlined(ctor));
    body.validate()?;
    Ok(())
}

#[test]
fn test_conditional_store_merges_with_one_phi() -> Result<()> {
    let mut program = Program::new();
    let object_ctor = program.root_constructor();
    let cell = program.add_class("Cell", ClassFlags::empty(), None);
    let v = program.add_field(cell, "v", FieldFlags::empty(), ValueType::Int)?;
    let ctor = program.add_method(cell, ".ctor", MethodFlags::CONSTRUCTOR, 0)?;
    program.set_body(
        ctor,
        SsaFunctionBuilder::new(1).build_with(|f| {
            let this = f.arg(0);
            f.block(0, |b| {
                b.call_void(CallKind::Direct, object_ctor, &[this]);
                b.ret();
            });
        }),
    )?;
    let set = program.add_method(cell, "set", MethodFlags::VIRTUAL, 1)?;
    program.set_body(
        set,
        SsaFunctionBuilder::new(2).build_with(|f| {
            let (this, value) = (f.arg(0), f.arg(1));
            f.block(0, |b| {
                b.store_field(this, v, value);
                b.ret();
            });
        }),
    )?;

    // c = new Cell(); if (flag) c.set(a); return c.v;
    let main = program.add_class("Main", ClassFlags::empty(), None);
    let run = program.add_method(main, "run", MethodFlags::STATIC, 2)?;
    program.set_body(
        run,
        SsaFunctionBuilder::new(2).build_with(|f| {
            let (flag, a) = (f.arg(0), f.arg(1));
            let mut cell_value = None;
            f.block(0, |b| {
                let c = b.new_object(cell, ctor, &[]);
                cell_value = Some(c);
                b.branch(flag, 1, 2);
            });
            let c = cell_value.expect("allocated in B0");
            f.block(1, |b| {
                b.call_void(CallKind::Virtual, set, &[c, a]);
                b.jump(3);
            });
            f.block(2, |b| b.jump(3));
            f.block(3, |b| {
                let read = b.load_field(c, v);
                b.ret_val(read);
            });
        }),
    )?;

    let program = Arc::new(program);
    let result = Compiler::default().compile(&program)?;
    let body = result.body(run).expect("run has a body");

    assert_eq!(allocations(&body), 0);
    assert_eq!(field_accesses(&body), 0);
    assert_eq!(body.phi_count(), 1);
    assert_eq!(result.stats().phis_inserted, 1);

    let ret = returned_value(&body).expect("run returns a value");
    let phi = body
        .blocks()
        .iter()
        .flat_map(|block| block.phi_nodes())
        .find(|phi| phi.result() == ret)
        .expect("the returned value is the merge");
    let values: Vec<SsaVarId> = phi.operands().iter().map(|op| op.value()).collect();
    assert_eq!(values.len(), 2);
    assert!(values.contains(&body.argument(1).expect("run takes two arguments")));
    assert!(values
        .iter()
        .any(|value| body.constant(*value) == Some(&ConstValue::I32(0))));
    body.validate()?;
    Ok(())
}

#[test]
fn test_aliases_through_copy_cast_and_phi() -> Result<()> {
    let mut fx = points()?;
    let (point, ctor, x) = (fx.point, fx.ctor, fx.x);
    let run = fx.program.add_method(fx.main, "run", MethodFlags::STATIC, 3)?;
    fx.program.set_body(
        run,
        SsaFunctionBuilder::new(3).build_with(|f| {
            let (a, c, flag) = (f.arg(0), f.arg(1), f.arg(2));
            let merged = f.var();
            let (mut p, mut q, mut r) = (None, None, None);
            f.block(0, |b| {
                let instance = b.new_object(point, ctor, &[a, c]);
                p = Some(instance);
                q = Some(b.copy(instance));
                b.branch(flag, 1, 2);
            });
            let p = p.expect("allocated in B0");
            f.block(1, |b| b.jump(3));
            f.block(2, |b| {
                r = Some(b.cast(p, point));
                b.jump(3);
            });
            let (q, r) = (q.expect("copy in B0"), r.expect("cast in B2"));
            f.block(3, |b| {
                b.phi(merged, &[(1, q), (2, r)]);
                let read = b.load_field(merged, x);
                b.ret_val(read);
            });
        }),
    )?;

    let program = Arc::new(fx.program);
    let result = Compiler::default().compile(&program)?;
    let body = result.body(run).expect("run has a body");

    assert_eq!(allocations(&body), 0);
    assert_eq!(body.phi_count(), 0);
    assert_eq!(
        count_ops(&body, |op| matches!(op, SsaOp::CastClass { .. })),
        0
    );
    assert_eq!(returned_value(&body), body.argument(0));
    body.validate()?;
    Ok(())
}

#[test]
fn test_phi_mixing_instance_with_null_is_rejected() -> Result<()> {
    let mut fx = points()?;
    let (point, ctor, x) = (fx.point, fx.ctor, fx.x);
    let run = fx.program.add_method(fx.main, "run", MethodFlags::STATIC, 3)?;
    fx.program.set_body(
        run,
        SsaFunctionBuilder::new(3).build_with(|f| {
            let (a, c, flag) = (f.arg(0), f.arg(1), f.arg(2));
            let merged = f.var();
            let (mut p, mut n) = (None, None);
            f.block(0, |b| {
                p = Some(b.new_object(point, ctor, &[a, c]));
                b.branch(flag, 1, 2);
            });
            f.block(1, |b| b.jump(3));
            f.block(2, |b| {
                n = Some(b.const_null());
                b.jump(3);
            });
            let (p, n) = (p.expect("allocated in B0"), n.expect("null in B2"));
            f.block(3, |b| {
                b.phi(merged, &[(1, p), (2, n)]);
                let read = b.load_field(merged, x);
                b.ret_val(read);
            });
        }),
    )?;

    let program = Arc::new(fx.program);
    let ctx = CompilerContext::from_program(&program);
    let mut body = program.method(run).and_then(|m| m.body.clone()).expect("body");
    let before = body.instruction_count();

    let changed = ClassInliningPass::new().run_on_method(&mut body, run, &ctx, &program)?;

    assert!(!changed);
    assert_eq!(body.instruction_count(), before);
    assert_eq!(allocations(&body), 1);
    assert_eq!(ctx.events.count_kind(EventKind::ClassInlineRejected), 1);
    Ok(())
}

#[test]
fn test_static_store_keeps_instance() -> Result<()> {
    let mut fx = points()?;
    let (point, ctor) = (fx.point, fx.ctor);
    let sink = fx
        .program
        .add_field(fx.main, "sink", FieldFlags::STATIC, ValueType::Reference)?;
    let run = fx.program.add_method(fx.main, "run", MethodFlags::STATIC, 2)?;
    fx.program.set_body(
        run,
        SsaFunctionBuilder::new(2).build_with(|f| {
            let (a, c) = (f.arg(0), f.arg(1));
            f.block(0, |b| {
                let p = b.new_object(point, ctor, &[a, c]);
                b.store_static(sink, p);
                b.ret();
            });
        }),
    )?;

    let program = Arc::new(fx.program);
    let result = Compiler::default().compile(&program)?;
    let body = result.body(run).expect("run has a body");

    assert_eq!(allocations(&body), 1);
    assert_eq!(
        count_ops(&body, |op| matches!(op, SsaOp::StoreStaticField { .. })),
        1
    );
    let stats = result.stats();
    assert_eq!(stats.classes_inlined, 0);
    assert!(stats.candidates_rejected >= 1);
    Ok(())
}

#[test]
fn test_singleton_read_becomes_constant() -> Result<()> {
    let mut program = Program::new();
    let object_ctor = program.root_constructor();
    let config = program.add_class("Config", ClassFlags::FINAL, None);
    let limit = program.add_field(config, "limit", FieldFlags::empty(), ValueType::Int)?;
    let instance = program.add_field(
        config,
        "INSTANCE",
        FieldFlags::STATIC | FieldFlags::FINAL,
        ValueType::Reference,
    )?;
    let ctor = program.add_method(config, ".ctor", MethodFlags::CONSTRUCTOR, 0)?;
    program.set_body(
        ctor,
        SsaFunctionBuilder::new(1).build_with(|f| {
            let this = f.arg(0);
            f.block(0, |b| {
                b.call_void(CallKind::Direct, object_ctor, &[this]);
                let value = b.const_i32(42);
                b.store_field(this, limit, value);
                b.ret();
            });
        }),
    )?;
    let clinit = program.add_method(
        config,
        "<clinit>",
        MethodFlags::STATIC | MethodFlags::CLASS_INITIALIZER,
        0,
    )?;
    program.set_body(
        clinit,
        SsaFunctionBuilder::new(0).build_with(|f| {
            f.block(0, |b| {
                let t = b.new_object(config, ctor, &[]);
                b.store_static(instance, t);
                b.ret();
            });
        }),
    )?;

    let main = program.add_class("Main", ClassFlags::empty(), None);
    let run = program.add_method(main, "run", MethodFlags::STATIC, 0)?;
    program.set_body(
        run,
        SsaFunctionBuilder::new(0).build_with(|f| {
            f.block(0, |b| {
                let c = b.load_static(instance);
                let value = b.load_field(c, limit);
                b.ret_val(value);
            });
        }),
    )?;

    let program = Arc::new(program);
    let result = Compiler::default().compile(&program)?;
    let body = result.body(run).expect("run has a body");

    assert_eq!(
        count_ops(&body, |op| matches!(op, SsaOp::LoadStaticField { .. })),
        0
    );
    assert_eq!(field_accesses(&body), 0);
    let ret = returned_value(&body).expect("run returns a value");
    assert_eq!(body.constant(ret), Some(&ConstValue::I32(42)));

    // The initializer allocates its own class and keeps the instance
    let init = result.body(clinit).expect("clinit has a body");
    assert_eq!(allocations(&init), 1);
    assert_eq!(result.stats().classes_inlined, 1);
    Ok(())
}

#[test]
fn test_unused_argument_is_nulled() -> Result<()> {
    let mut fx = points()?;
    let (point, ctor) = (fx.point, fx.ctor);
    let ignore = fx.program.add_method(fx.main, "ignore", MethodFlags::STATIC, 2)?;
    fx.program.set_body(
        ignore,
        SsaFunctionBuilder::new(2).build_with(|f| {
            let k = f.arg(1);
            f.block(0, |b| b.ret_val(k));
        }),
    )?;
    let run = fx.program.add_method(fx.main, "run", MethodFlags::STATIC, 2)?;
    fx.program.set_body(
        run,
        SsaFunctionBuilder::new(2).build_with(|f| {
            let (a, c) = (f.arg(0), f.arg(1));
            f.block(0, |b| {
                let p = b.new_object(point, ctor, &[a, c]);
                let r = b.call(CallKind::Static, ignore, &[p, a]);
                b.ret_val(r);
            });
        }),
    )?;

    let program = Arc::new(fx.program);
    let result = Compiler::default().compile(&program)?;
    let body = result.body(run).expect("run has a body");

    assert_eq!(allocations(&body), 0);
    let args = body
        .iter_instructions()
        .find_map(|(_, _, instr)| match instr.op() {
            SsaOp::Call { method, args, .. } if method.token() == ignore => Some(args.clone()),
            _ => None,
        })
        .expect("the call to ignore survives");
    assert_eq!(body.constant(args[0]), Some(&ConstValue::Null));
    assert_eq!(Some(args[1]), body.argument(0));
    assert_eq!(result.events().count_kind(EventKind::ArgumentNulled), 1);
    Ok(())
}

#[test]
fn test_helper_taking_instance_is_inlined() -> Result<()> {
    let mut fx = points()?;
    let (point, ctor, x, y) = (fx.point, fx.ctor, fx.x, fx.y);
    let sum = fx.program.add_method(fx.main, "sum", MethodFlags::STATIC, 1)?;
    fx.program.set_body(
        sum,
        SsaFunctionBuilder::new(1).build_with(|f| {
            let p = f.arg(0);
            f.block(0, |b| {
                let vx = b.load_field(p, x);
                let vy = b.load_field(p, y);
                let s = b.add(vx, vy);
                b.ret_val(s);
            });
        }),
    )?;
    let run = fx.program.add_method(fx.main, "run", MethodFlags::STATIC, 2)?;
    fx.program.set_body(
        run,
        SsaFunctionBuilder::new(2).build_with(|f| {
            let (a, c) = (f.arg(0), f.arg(1));
            f.block(0, |b| {
                let p = b.new_object(point, ctor, &[a, c]);
                let r = b.call(CallKind::Static, sum, &[p]);
                b.ret_val(r);
            });
        }),
    )?;

    let program = Arc::new(fx.program);
    let result = Compiler::default().compile(&program)?;
    let body = result.body(run).expect("run has a body");

    assert_eq!(allocations(&body), 0);
    assert_eq!(field_accesses(&body), 0);
    assert_eq!(count_ops(&body, |op| matches!(op, SsaOp::Call { .. })), 0);
    assert!(result.context().was_inlined(sum));
    body.validate()?;
    Ok(())
}

/// Builds `run(a, c) = new Point(a, c).x` and compiles it with `config`.
fn compile_point_read(
    config: ClassInliningConfig,
    always_inline: bool,
) -> Result<(CompilationResult, Token)> {
    let mut fx = points()?;
    let (point, ctor, x) = (fx.point, fx.ctor, fx.x);
    let run = fx.program.add_method(fx.main, "run", MethodFlags::STATIC, 2)?;
    fx.program.set_body(
        run,
        SsaFunctionBuilder::new(2).build_with(|f| {
            let (a, c) = (f.arg(0), f.arg(1));
            f.block(0, |b| {
                let p = b.new_object(point, ctor, &[a, c]);
                let vx = b.load_field(p, x);
                b.ret_val(vx);
            });
        }),
    )?;

    let program = Arc::new(fx.program);
    let ctx = CompilerContext::from_program(&program);
    if always_inline {
        ctx.always_inline.insert(point);
    }
    let compiler = Compiler::new(CompilerConfig {
        class_inlining: config,
        ..CompilerConfig::default()
    });
    Ok((compiler.compile_with(ctx, &program)?, run))
}

#[test]
fn test_budget_is_monotonic() -> Result<()> {
    let mut first_committed = None;
    for allowance in 0..6 {
        let config = ClassInliningConfig {
            instruction_allowance: allowance,
            ..ClassInliningConfig::default()
        };
        let (result, run) = compile_point_read(config, false)?;
        let body = result.body(run).expect("run has a body");
        let committed = allocations(&body) == 0;
        match first_committed {
            Some(_) => assert!(committed, "allowance {allowance} must still commit"),
            None if committed => first_committed = Some(allowance),
            None => assert_eq!(result.stats().classes_inlined, 0),
        }
    }
    // Constructor (one non-field instruction) plus the root constructor
    assert_eq!(first_committed, Some(2));
    Ok(())
}

#[test]
fn test_always_inline_class_ignores_budget() -> Result<()> {
    let config = ClassInliningConfig {
        instruction_allowance: 0,
        ..ClassInliningConfig::default()
    };
    let (result, run) = compile_point_read(config, true)?;
    let body = result.body(run).expect("run has a body");

    assert_eq!(allocations(&body), 0);
    assert_eq!(returned_value(&body), body.argument(0));
    Ok(())
}

#[test]
fn test_excluded_class_is_kept() -> Result<()> {
    let mut fx = points()?;
    let (point, ctor, x) = (fx.point, fx.ctor, fx.x);
    let run = fx.program.add_method(fx.main, "run", MethodFlags::STATIC, 2)?;
    fx.program.set_body(
        run,
        SsaFunctionBuilder::new(2).build_with(|f| {
            let (a, c) = (f.arg(0), f.arg(1));
            f.block(0, |b| {
                let p = b.new_object(point, ctor, &[a, c]);
                let vx = b.load_field(p, x);
                b.ret_val(vx);
            });
        }),
    )?;

    let program = Arc::new(fx.program);
    let ctx = CompilerContext::from_program(&program);
    ctx.no_class_inline.insert(point);
    let result = Compiler::default().compile_with(ctx, &program)?;
    let body = result.body(run).expect("run has a body");

    assert_eq!(allocations(&body), 1);
    assert_eq!(result.stats().classes_inlined, 0);
    Ok(())
}

#[test]
fn test_unplanned_call_aborts_and_restores() -> Result<()> {
    let mut program = Program::new();
    let object_ctor = program.root_constructor();
    let class = program.add_class("Chain", ClassFlags::empty(), None);
    let ctor = program.add_method(class, ".ctor", MethodFlags::CONSTRUCTOR, 0)?;
    program.set_body(
        ctor,
        SsaFunctionBuilder::new(1).build_with(|f| {
            let this = f.arg(0);
            f.block(0, |b| {
                b.call_void(CallKind::Direct, object_ctor, &[this]);
                b.ret();
            });
        }),
    )?;
    let itself = program.add_method(class, "itself", MethodFlags::VIRTUAL, 0)?;
    program.set_body(
        itself,
        SsaFunctionBuilder::new(1).build_with(|f| {
            let this = f.arg(0);
            f.block(0, |b| b.ret_val(this));
        }),
    )?;
    let touch = program.add_method(class, "touch", MethodFlags::VIRTUAL, 0)?;
    program.set_body(
        touch,
        SsaFunctionBuilder::new(1).build_with(|f| f.block(0, |b| b.ret())),
    )?;
    // run() { let same = this.itself(); same.touch(); }
    // The summary only sees `itself` called on the receiver; `touch`
    // surfaces once `itself` is inlined.
    let outer = program.add_method(class, "outer", MethodFlags::VIRTUAL, 0)?;
    program.set_body(
        outer,
        SsaFunctionBuilder::new(1).build_with(|f| {
            let this = f.arg(0);
            f.block(0, |b| {
                let same = b.call(CallKind::Virtual, itself, &[this]);
                b.call_void(CallKind::Virtual, touch, &[same]);
                b.ret();
            });
        }),
    )?;

    let main = program.add_class("Main", ClassFlags::empty(), None);
    let run = program.add_method(main, "run", MethodFlags::STATIC, 0)?;
    program.set_body(
        run,
        SsaFunctionBuilder::new(0).build_with(|f| {
            f.block(0, |b| {
                let c = b.new_object(class, ctor, &[]);
                b.call_void(CallKind::Virtual, outer, &[c]);
                b.ret();
            });
        }),
    )?;

    let program = Arc::new(program);
    let ctx = CompilerContext::from_program(&program);
    let original = program.method(run).and_then(|m| m.body.clone()).expect("body");
    let mut body = original.clone();

    let changed = ClassInliningPass::new().run_on_method(&mut body, run, &ctx, &program)?;

    assert!(!changed);
    assert_eq!(body.instruction_count(), original.instruction_count());
    assert_eq!(body.block_count(), original.block_count());
    assert_eq!(allocations(&body), 1);
    assert_eq!(ctx.events.count_kind(EventKind::ClassInlineAborted), 1);
    assert_eq!(ctx.events.count_kind(EventKind::ClassInlined), 0);
    body.validate()?;
    Ok(())
}

#[test]
fn test_second_run_changes_nothing() -> Result<()> {
    let mut fx = points()?;
    let (point, ctor, x, y) = (fx.point, fx.ctor, fx.x, fx.y);
    let run = fx.program.add_method(fx.main, "run", MethodFlags::STATIC, 2)?;
    fx.program.set_body(
        run,
        SsaFunctionBuilder::new(2).build_with(|f| {
            let (a, c) = (f.arg(0), f.arg(1));
            f.block(0, |b| {
                let p = b.new_object(point, ctor, &[a, c]);
                let vx = b.load_field(p, x);
                let vy = b.load_field(p, y);
                let s = b.mul(vx, vy);
                b.ret_val(s);
            });
        }),
    )?;

    let program = Arc::new(fx.program);
    let ctx = CompilerContext::from_program(&program);
    let pass = ClassInliningPass::new();
    let mut body = program.method(run).and_then(|m| m.body.clone()).expect("body");

    assert!(pass.run_on_method(&mut body, run, &ctx, &program)?);
    let after_first = body.instruction_count();
    assert!(!pass.run_on_method(&mut body, run, &ctx, &program)?);
    assert_eq!(body.instruction_count(), after_first);
    assert_eq!(ctx.events.count_kind(EventKind::ClassInlined), 1);
    Ok(())
}

#[test]
fn test_compiler_returns_every_body() -> Result<()> {
    let mut fx = points()?;
    let (point, ctor) = (fx.point, fx.ctor);
    let run = fx.program.add_method(fx.main, "run", MethodFlags::STATIC, 2)?;
    fx.program.set_body(
        run,
        SsaFunctionBuilder::new(2).build_with(|f| {
            let (a, c) = (f.arg(0), f.arg(1));
            f.block(0, |b| {
                b.new_object(point, ctor, &[a, c]);
                b.ret();
            });
        }),
    )?;

    let program = Arc::new(fx.program);
    let result = Compiler::default().compile(&program)?;
    assert!(result.iterations() >= 1);

    let bodies = result.into_bodies();
    assert!(bodies.contains_key(&run));
    assert!(bodies.contains_key(&ctor));
    assert!(bodies.contains_key(&program.root_constructor()));
    for body in bodies.values() {
        body.validate()?;
    }
    Ok(())
}

#[test]
fn test_constant_point_read_folds() -> Result<()> {
    let mut fx = points()?;
    let (point, ctor, x) = (fx.point, fx.ctor, fx.x);
    let run = fx.program.add_method(fx.main, "run", MethodFlags::STATIC, 0)?;
    fx.program.set_body(
        run,
        SsaFunctionBuilder::new(0).build_with(|f| {
            f.block(0, |b| {
                let one = b.const_i32(1);
                let two = b.const_i32(2);
                let p = b.new_object(point, ctor, &[one, two]);
                let vx = b.load_field(p, x);
                b.ret_val(vx);
            });
        }),
    )?;

    let program = Arc::new(fx.program);
    let result = Compiler::default().compile(&program)?;
    let body = result.body(run).expect("run has a body");

    let ret = returned_value(&body).expect("run returns a value");
    assert_eq!(body.constant(ret), Some(&ConstValue::I32(1)));
    assert_eq!(allocations(&body), 0);
    assert_eq!(field_accesses(&body), 0);
    assert_eq!(count_ops(&body, |op| matches!(op, SsaOp::Call { .. })), 0);
    Ok(())
}

#[test]
fn test_singleton_accessor_becomes_constant() -> Result<()> {
    let mut program = Program::new();
    let object_ctor = program.root_constructor();
    let mode = program.add_class("Mode", ClassFlags::FINAL, None);
    let instance = program.add_field(
        mode,
        "INSTANCE",
        FieldFlags::STATIC | FieldFlags::FINAL,
        ValueType::Reference,
    )?;
    let ctor = program.add_method(mode, ".ctor", MethodFlags::CONSTRUCTOR | MethodFlags::PRIVATE, 0)?;
    program.set_body(
        ctor,
        SsaFunctionBuilder::new(1).build_with(|f| {
            let this = f.arg(0);
            f.block(0, |b| {
                b.call_void(CallKind::Direct, object_ctor, &[this]);
                b.ret();
            });
        }),
    )?;
    let clinit = program.add_method(
        mode,
        "<clinit>",
        MethodFlags::STATIC | MethodFlags::CLASS_INITIALIZER,
        0,
    )?;
    program.set_body(
        clinit,
        SsaFunctionBuilder::new(0).build_with(|f| {
            f.block(0, |b| {
                let t = b.new_object(mode, ctor, &[]);
                b.store_static(instance, t);
                b.ret();
            });
        }),
    )?;
    let id = program.add_method(mode, "id", MethodFlags::VIRTUAL, 0)?;
    program.set_body(
        id,
        SsaFunctionBuilder::new(1).build_with(|f| {
            f.block(0, |b| {
                let seven = b.const_i32(7);
                b.ret_val(seven);
            });
        }),
    )?;

    let main = program.add_class("Main", ClassFlags::empty(), None);
    let run = program.add_method(main, "run", MethodFlags::STATIC, 0)?;
    program.set_body(
        run,
        SsaFunctionBuilder::new(0).build_with(|f| {
            f.block(0, |b| {
                let m = b.load_static(instance);
                let r = b.call(CallKind::Virtual, id, &[m]);
                b.ret_val(r);
            });
        }),
    )?;

    let program = Arc::new(program);
    let result = Compiler::default().compile(&program)?;
    let body = result.body(run).expect("run has a body");

    let ret = returned_value(&body).expect("run returns a value");
    assert_eq!(body.constant(ret), Some(&ConstValue::I32(7)));
    assert_eq!(
        count_ops(&body, |op| matches!(
            op,
            SsaOp::LoadStaticField { .. } | SsaOp::Call { .. }
        )),
        0
    );
    assert!(result.context().was_inlined(id));
    body.validate()?;
    Ok(())
}

#[test]
fn test_many_getter_calls_all_inline() -> Result<()> {
    let mut fx = points()?;
    let (point, ctor, x) = (fx.point, fx.ctor, fx.x);
    let get_x = fx.program.add_method(point, "getX", MethodFlags::VIRTUAL, 0)?;
    fx.program.set_body(
        get_x,
        SsaFunctionBuilder::new(1).build_with(|f| {
            let this = f.arg(0);
            f.block(0, |b| {
                let v = b.load_field(this, x);
                b.ret_val(v);
            });
        }),
    )?;
    // More calls on the instance than the commit runs rounds
    let calls = ClassInliningConfig::default().max_commit_rounds + 4;
    let run = fx.program.add_method(fx.main, "run", MethodFlags::STATIC, 2)?;
    fx.program.set_body(
        run,
        SsaFunctionBuilder::new(2).build_with(|f| {
            let (a, c) = (f.arg(0), f.arg(1));
            f.block(0, |b| {
                let p = b.new_object(point, ctor, &[a, c]);
                let mut acc = b.call(CallKind::Virtual, get_x, &[p]);
                for _ in 1..calls {
                    let v = b.call(CallKind::Virtual, get_x, &[p]);
                    acc = b.add(acc, v);
                }
                b.ret_val(acc);
            });
        }),
    )?;

    let program = Arc::new(fx.program);
    let result = Compiler::default().compile(&program)?;
    let body = result.body(run).expect("run has a body");

    assert_eq!(allocations(&body), 0);
    assert_eq!(field_accesses(&body), 0);
    assert_eq!(count_ops(&body, |op| matches!(op, SsaOp::Call { .. })), 0);
    assert_eq!(result.events().count_kind(EventKind::ClassInlineAborted), 0);
    assert_eq!(result.stats().classes_inlined, 1);
    body.validate()?;
    Ok(())
}

/// Adds `Printer.show(Point p) { return p.x; }` to the fixture.
fn printer(fx: &mut Points) -> Result<(Token, Token)> {
    let x = fx.x;
    let class = fx.program.add_class("Printer", ClassFlags::empty(), None);
    let show = fx.program.add_method(class, "show", MethodFlags::VIRTUAL, 1)?;
    fx.program.set_body(
        show,
        SsaFunctionBuilder::new(2).build_with(|f| {
            let p = f.arg(1);
            f.block(0, |b| {
                let v = b.load_field(p, x);
                b.ret_val(v);
            });
        }),
    )?;
    Ok((class, show))
}

#[test]
fn test_argument_call_on_nullable_receiver_keeps_instance() -> Result<()> {
    let mut fx = points()?;
    let (point, ctor) = (fx.point, fx.ctor);
    let (_, show) = printer(&mut fx)?;
    // run(o, a, c) { return o.show(new Point(a, c)); } throws when o is null
    let run = fx.program.add_method(fx.main, "run", MethodFlags::STATIC, 3)?;
    fx.program.set_body(
        run,
        SsaFunctionBuilder::new(3).build_with(|f| {
            let (o, a, c) = (f.arg(0), f.arg(1), f.arg(2));
            f.block(0, |b| {
                let p = b.new_object(point, ctor, &[a, c]);
                let r = b.call(CallKind::Virtual, show, &[o, p]);
                b.ret_val(r);
            });
        }),
    )?;

    let program = Arc::new(fx.program);
    let result = Compiler::default().compile(&program)?;
    let body = result.body(run).expect("run has a body");

    assert_eq!(allocations(&body), 1);
    let receiver = body
        .iter_instructions()
        .find_map(|(_, _, instr)| match instr.op() {
            SsaOp::Call { method, args, .. } if method.token() == show => args.first().copied(),
            _ => None,
        })
        .expect("the call to show survives");
    assert_eq!(Some(receiver), body.argument(0));
    assert_eq!(result.stats().classes_inlined, 0);
    assert!(!result.context().was_inlined(show));
    Ok(())
}

#[test]
fn test_argument_call_on_this_is_inlined() -> Result<()> {
    let mut fx = points()?;
    let (point, ctor) = (fx.point, fx.ctor);
    let (class, show) = printer(&mut fx)?;
    // Printer.render(a, c) { return this.show(new Point(a, c)); }
    let render = fx.program.add_method(class, "render", MethodFlags::VIRTUAL, 2)?;
    fx.program.set_body(
        render,
        SsaFunctionBuilder::new(3).build_with(|f| {
            let (this, a, c) = (f.arg(0), f.arg(1), f.arg(2));
            f.block(0, |b| {
                let p = b.new_object(point, ctor, &[a, c]);
                let r = b.call(CallKind::Virtual, show, &[this, p]);
                b.ret_val(r);
            });
        }),
    )?;

    let program = Arc::new(fx.program);
    let result = Compiler::default().compile(&program)?;
    let body = result.body(render).expect("render has a body");

    assert_eq!(allocations(&body), 0);
    assert_eq!(count_ops(&body, |op| matches!(op, SsaOp::Call { .. })), 0);
    assert_eq!(returned_value(&body), body.argument(1));
    assert!(result.context().was_inlined(show));
    body.validate()?;
    Ok(())
}

#[test]
fn test_read_behind_null_test_is_dropped() -> Result<()> {
    let mut fx = points()?;
    let (point, ctor, x, y) = (fx.point, fx.ctor, fx.x, fx.y);
    // p = new Point(a, c); if (p == null) return p.x; return p.y;
    let run = fx.program.add_method(fx.main, "run", MethodFlags::STATIC, 2)?;
    fx.program.set_body(
        run,
        SsaFunctionBuilder::new(2).build_with(|f| {
            let (a, c) = (f.arg(0), f.arg(1));
            let mut instance = None;
            f.block(0, |b| {
                let p = b.new_object(point, ctor, &[a, c]);
                instance = Some(p);
                b.branch_null(p, NullTest::IsNull, 1, 2);
            });
            let p = instance.expect("allocated in B0");
            f.block(1, |b| {
                let vx = b.load_field(p, x);
                b.ret_val(vx);
            });
            f.block(2, |b| {
                let vy = b.load_field(p, y);
                b.ret_val(vy);
            });
        }),
    )?;

    // The pass alone, so the null test is still there when it commits
    let program = Arc::new(fx.program);
    let ctx = CompilerContext::from_program(&program);
    let mut body = program.method(run).and_then(|m| m.body.clone()).expect("body");

    assert!(ClassInliningPass::new().run_on_method(&mut body, run, &ctx, &program)?);

    assert_eq!(allocations(&body), 0);
    assert_eq!(field_accesses(&body), 0);
    assert_eq!(
        count_ops(&body, |op| matches!(op, SsaOp::BranchNull { .. })),
        0
    );
    assert_eq!(returned_value(&body), body.argument(1));
    assert_eq!(ctx.events.count_kind(EventKind::ClassInlineAborted), 0);
    assert_eq!(ctx.events.count_kind(EventKind::ClassInlined), 1);
    body.validate()?;
    Ok(())
}
