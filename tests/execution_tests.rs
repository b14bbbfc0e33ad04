//! End-to-end tests: build a module, instantiate it and run it.
//!
//! Every test goes through the public pipeline only: the builder validates
//! and compiles, the instance links, and the interpreter executes the
//! compiled bytecode.

mod common;

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use rstest::rstest;
    use wasmkit::builder::ModuleBuilder;
    use wasmkit::error::BuildError;
    use wasmkit::expr::Expr;
    use wasmkit::module::Func;
    use wasmkit::runtime::{Config, HostFunc, ImportObject, Instance, RuntimeError, SharedGlobal, Value};
    use wasmkit::types::{BinaryOp, LoadOp, RelOp, StoreOp, ValueType};

    use crate::common::{call1, instantiate, instantiate_with};

    // =======================================================================
    // Helpers
    // =======================================================================

    /// Exports `name(a, b) = a <op> b` over `ty`.
    fn binary_export(mb: &mut ModuleBuilder, name: &str, ty: ValueType, op: BinaryOp) {
        let mut f = mb.function(&[ty]);
        let a = f.param(ty).unwrap();
        let b = f.param(ty).unwrap();
        f.push(Expr::binary(op, Expr::local(a), Expr::local(b)).unwrap()).unwrap();
        let func = f.finish().unwrap();
        mb.export_function(name, &func).unwrap();
    }

    /// A function of no arguments returning `value`.
    fn constant_function(mb: &mut ModuleBuilder, value: i32) -> Func {
        let mut f = mb.function(&[ValueType::I32]);
        f.push(Expr::i32(value)).unwrap();
        f.finish().unwrap()
    }

    // =======================================================================
    // Arithmetic
    // =======================================================================

    #[test]
    fn test_integer_wraparound() {
        let mut mb = ModuleBuilder::new();
        binary_export(&mut mb, "add32", ValueType::I32, BinaryOp::Add);
        binary_export(&mut mb, "add64", ValueType::I64, BinaryOp::Add);
        binary_export(&mut mb, "mul64", ValueType::I64, BinaryOp::Mul);
        let instance = instantiate(mb);

        assert_eq!(
            call1(&instance, "add32", &[Value::I32(2147483647), Value::I32(1)]),
            Value::I32(-2147483648)
        );
        assert_eq!(
            call1(&instance, "add64", &[Value::I64(i64::MAX), Value::I64(1)]),
            Value::I64(i64::MIN)
        );
        assert_eq!(
            call1(&instance, "mul64", &[Value::I64(1 << 62), Value::I64(4)]),
            Value::I64(0)
        );
    }

    #[rstest]
    #[case(BinaryOp::DivS, -7, 2, -3)]
    #[case(BinaryOp::DivU, -1, 2, 2147483647)]
    #[case(BinaryOp::RemS, -7, 2, -1)]
    #[case(BinaryOp::ShrS, -16, 34, -4)]
    #[case(BinaryOp::ShrU, -16, 28, 15)]
    #[case(BinaryOp::Rotl, 0x4000_0001, 2, 5)]
    fn test_signed_unsigned_ops(#[case] op: BinaryOp, #[case] a: i32, #[case] b: i32, #[case] expected: i32) {
        let mut mb = ModuleBuilder::new();
        binary_export(&mut mb, "op", ValueType::I32, op);
        let instance = instantiate(mb);
        assert_eq!(call1(&instance, "op", &[Value::I32(a), Value::I32(b)]), Value::I32(expected));
    }

    #[test]
    fn test_division_traps() {
        let mut mb = ModuleBuilder::new();
        binary_export(&mut mb, "div", ValueType::I32, BinaryOp::DivS);
        binary_export(&mut mb, "rem", ValueType::I32, BinaryOp::RemS);
        let instance = instantiate(mb);

        assert!(matches!(
            instance.invoke("div", &[Value::I32(1), Value::I32(0)]),
            Err(RuntimeError::DivisionByZero)
        ));
        assert!(matches!(
            instance.invoke("div", &[Value::I32(i32::MIN), Value::I32(-1)]),
            Err(RuntimeError::IntegerOverflow)
        ));
        assert_eq!(
            call1(&instance, "rem", &[Value::I32(i32::MIN), Value::I32(-1)]),
            Value::I32(0)
        );
    }

    #[test]
    fn test_float_comparison_with_nan() {
        let mut mb = ModuleBuilder::new();
        let mut f = mb.function(&[ValueType::I32]);
        let x = f.param(ValueType::F64).unwrap();
        let lt = Expr::compare(RelOp::Lt, Expr::local(x), Expr::f64(1.0)).unwrap();
        f.push(Expr::bool_to_i32(lt).unwrap()).unwrap();
        let func = f.finish().unwrap();
        mb.export_function("lt1", &func).unwrap();
        let instance = instantiate(mb);

        assert_eq!(call1(&instance, "lt1", &[Value::F64(0.5)]), Value::I32(1));
        assert_eq!(call1(&instance, "lt1", &[Value::F64(f64::NAN)]), Value::I32(0));
    }

    // =======================================================================
    // Control flow
    // =======================================================================

    #[rstest]
    #[case(0, 0)]
    #[case(1, 1)]
    #[case(10, 45)]
    #[case(100, 4950)]
    fn test_counted_loop(#[case] n: i32, #[case] expected: i32) {
        // sum of 0..n with for_
        let mut mb = ModuleBuilder::new();
        let mut f = mb.function(&[ValueType::I32]);
        let limit = f.param(ValueType::I32).unwrap();
        let i = f.local(ValueType::I32).unwrap();
        let sum = f.local(ValueType::I32).unwrap();
        f.for_(i, Expr::i32(0), Expr::local(limit), Expr::i32(1), |f| {
            f.set(sum, Expr::binary(BinaryOp::Add, Expr::local(sum), Expr::local(i))?)
        })
        .unwrap();
        f.push(Expr::local(sum)).unwrap();
        let func = f.finish().unwrap();
        mb.export_function("sum", &func).unwrap();
        let instance = instantiate(mb);

        let independent: i32 = (0..n).sum();
        assert_eq!(independent, expected);
        assert_eq!(call1(&instance, "sum", &[Value::I32(n)]), Value::I32(expected));
    }

    #[test]
    fn test_br_to_loop_reenters_and_br_to_block_exits() {
        // block $out
        //   loop $again
        //     count += 1
        //     br_if $out (count >= 3)
        //     br $again
        //   end
        // end
        let mut mb = ModuleBuilder::new();
        let mut f = mb.function(&[ValueType::I32]);
        let count = f.local(ValueType::I32).unwrap();
        let out = f.label().unwrap();
        f.block().unwrap();
        let again = f.label().unwrap();
        f.loop_().unwrap();
        f.set(
            count,
            Expr::binary(BinaryOp::Add, Expr::local(count), Expr::i32(1)).unwrap(),
        )
        .unwrap();
        f.br_if(
            out,
            Expr::compare(RelOp::GeS, Expr::local(count), Expr::i32(3)).unwrap(),
        )
        .unwrap();
        f.br(again).unwrap();
        f.end().unwrap();
        f.end().unwrap();
        f.push(Expr::local(count)).unwrap();
        let func = f.finish().unwrap();
        mb.export_function("count", &func).unwrap();
        let instance = instantiate(mb);

        assert_eq!(call1(&instance, "count", &[]), Value::I32(3));
    }

    #[test]
    fn test_block_result_carried_by_branch() {
        // (block (result i64) (br_if 0 (i64.const 10) (x > 0)) drop (i64.const 20))
        let mut mb = ModuleBuilder::new();
        let mut f = mb.function(&[ValueType::I64]);
        let x = f.param(ValueType::I32).unwrap();
        let done = f.label().unwrap();
        f.block_with(&[ValueType::I64]).unwrap();
        f.push(Expr::i64(10)).unwrap();
        f.br_if(done, Expr::compare(RelOp::GtS, Expr::local(x), Expr::i32(0)).unwrap())
            .unwrap();
        f.drop().unwrap();
        f.push(Expr::i64(20)).unwrap();
        f.end().unwrap();
        let func = f.finish().unwrap();
        mb.export_function("pick", &func).unwrap();
        let instance = instantiate(mb);

        assert_eq!(call1(&instance, "pick", &[Value::I32(1)]), Value::I64(10));
        assert_eq!(call1(&instance, "pick", &[Value::I32(0)]), Value::I64(20));
    }

    #[rstest]
    #[case(0, 100)]
    #[case(1, 101)]
    #[case(2, 102)]
    #[case(3, 199)]
    #[case(-1, 199)]
    fn test_br_table(#[case] index: i32, #[case] expected: i32) {
        let mut mb = ModuleBuilder::new();
        let mut f = mb.function(&[ValueType::I32]);
        let x = f.param(ValueType::I32).unwrap();
        let labels: Vec<_> = (0..4).map(|_| {
            let label = f.label().unwrap();
            f.block().unwrap();
            label
        }).collect();
        f.br_table(&[labels[3], labels[2], labels[1]], labels[0], Expr::local(x))
            .unwrap();
        for value in [100, 101, 102] {
            f.end().unwrap();
            f.push(Expr::i32(value)).unwrap();
            f.ret().unwrap();
        }
        f.end().unwrap();
        f.push(Expr::i32(199)).unwrap();
        let func = f.finish().unwrap();
        mb.export_function("table", &func).unwrap();
        let instance = instantiate(mb);

        assert_eq!(call1(&instance, "table", &[Value::I32(index)]), Value::I32(expected));
    }

    // =======================================================================
    // Calls
    // =======================================================================

    #[rstest]
    #[case(1, 1)]
    #[case(2, 2)]
    #[case(3, 6)]
    #[case(4, 24)]
    fn test_factorial_recursive(#[case] n: i64, #[case] expected: i64) {
        let mut mb = ModuleBuilder::new();
        let mut f = mb.function(&[ValueType::I64]);
        let x = f.param(ValueType::I64).unwrap();
        let fac = f.func();
        f.if_with(
            Expr::compare(RelOp::LeS, Expr::local(x), Expr::i64(1)).unwrap(),
            &[ValueType::I64],
        )
        .unwrap();
        f.push(Expr::i64(1)).unwrap();
        f.else_().unwrap();
        let rest = Expr::call(
            &fac,
            vec![Expr::binary(BinaryOp::Sub, Expr::local(x), Expr::i64(1)).unwrap()],
        )
        .unwrap();
        f.push(Expr::binary(BinaryOp::Mul, Expr::local(x), rest).unwrap()).unwrap();
        f.end().unwrap();
        let fac = f.finish().unwrap();
        mb.export_function("fac", &fac).unwrap();
        let instance = instantiate(mb);

        assert_eq!(call1(&instance, "fac", &[Value::I64(n)]), Value::I64(expected));
    }

    #[rstest]
    #[case(1, 1)]
    #[case(2, 2)]
    #[case(3, 6)]
    #[case(4, 24)]
    fn test_factorial_iterative(#[case] n: i64, #[case] expected: i64) {
        let mut mb = ModuleBuilder::new();
        let mut f = mb.function(&[ValueType::I64]);
        let x = f.param(ValueType::I64).unwrap();
        let i = f.local(ValueType::I64).unwrap();
        let acc = f.local(ValueType::I64).unwrap();
        f.set(acc, Expr::i64(1)).unwrap();
        let until = Expr::binary(BinaryOp::Add, Expr::local(x), Expr::i64(1)).unwrap();
        f.for_(i, Expr::i64(1), until, Expr::i64(1), |f| {
            f.set(acc, Expr::binary(BinaryOp::Mul, Expr::local(acc), Expr::local(i))?)
        })
        .unwrap();
        f.push(Expr::local(acc)).unwrap();
        let fac = f.finish().unwrap();
        mb.export_function("fac", &fac).unwrap();
        let instance = instantiate(mb);

        assert_eq!(call1(&instance, "fac", &[Value::I64(n)]), Value::I64(expected));
    }

    /// fac_a(n) = n <= 1 ? 1 : n * fac_b(n - 1); fac_b(n) = fac_a(n)
    fn mutual_factorial(declare_first: bool) -> Instance {
        let mut mb = ModuleBuilder::new();
        let fac_b = mb.forward_decl(&[ValueType::I64], &[ValueType::I64]);

        let mut f = mb.function(&[ValueType::I64]);
        let n = f.param(ValueType::I64).unwrap();
        f.if_with(
            Expr::compare(RelOp::LeS, Expr::local(n), Expr::i64(1)).unwrap(),
            &[ValueType::I64],
        )
        .unwrap();
        f.push(Expr::i64(1)).unwrap();
        f.else_().unwrap();
        let rest = Expr::call(
            &fac_b,
            vec![Expr::binary(BinaryOp::Sub, Expr::local(n), Expr::i64(1)).unwrap()],
        )
        .unwrap();
        f.push(Expr::binary(BinaryOp::Mul, Expr::local(n), rest).unwrap()).unwrap();
        f.end().unwrap();
        let fac_a = f.finish().unwrap();

        let mut g = if declare_first {
            mb.implementation(&fac_b).unwrap()
        } else {
            mb.implementation_with(&fac_b, &[ValueType::I64], &[ValueType::I64]).unwrap()
        };
        let m = g.params()[0];
        g.push(Expr::call(&fac_a, vec![Expr::local(m)]).unwrap()).unwrap();
        g.finish().unwrap();

        mb.export_function("fac", &fac_a).unwrap();
        instantiate(mb)
    }

    #[rstest]
    #[case(true)]
    #[case(false)]
    fn test_forward_declaration_mutual_recursion(#[case] declare_first: bool) {
        let instance = mutual_factorial(declare_first);
        for (n, expected) in [(1, 1), (2, 2), (3, 6), (4, 24), (10, 3628800)] {
            assert_eq!(call1(&instance, "fac", &[Value::I64(n)]), Value::I64(expected));
        }
    }

    #[test]
    fn test_call_depth_bounded() {
        let mut mb = ModuleBuilder::new();
        let mut f = mb.function(&[ValueType::I32]);
        let x = f.param(ValueType::I32).unwrap();
        let me = f.func();
        f.push(Expr::call(&me, vec![Expr::local(x)]).unwrap()).unwrap();
        let forever = f.finish().unwrap();
        mb.export_function("forever", &forever).unwrap();
        let module = mb.finish().unwrap();

        let config = Config { max_call_depth: 64 };
        let instance = Instance::with_config(module, &ImportObject::new(), config).unwrap();
        assert!(matches!(
            instance.invoke("forever", &[Value::I32(0)]),
            Err(RuntimeError::CallStackOverflow)
        ));
    }

    // =======================================================================
    // Memory
    // =======================================================================

    fn memory_module() -> Instance {
        let mut mb = ModuleBuilder::new();
        mb.memory(1, None).unwrap();
        mb.data(0, b"ABCDEFGHIJKLMNOPQRST".to_vec()).unwrap();
        mb.data(20, b"WXYZ".to_vec()).unwrap();

        let mut f = mb.function(&[ValueType::I32]);
        let addr = f.param(ValueType::I32).unwrap();
        f.push(Expr::load(LoadOp::I32Load8U, 0, Expr::local(addr)).unwrap()).unwrap();
        let load8 = f.finish().unwrap();
        mb.export_function("load8", &load8).unwrap();

        let mut f = mb.function(&[]);
        let addr = f.param(ValueType::I32).unwrap();
        let value = f.param(ValueType::I64).unwrap();
        f.store(StoreOp::I64Store, 4, Expr::local(addr), Expr::local(value)).unwrap();
        let store = f.finish().unwrap();
        mb.export_function("store64", &store).unwrap();

        mb.export_memory("memory").unwrap();
        instantiate(mb)
    }

    #[rstest]
    #[case(0, 65)]
    #[case(1, 66)]
    #[case(20, 87)]
    #[case(23, 90)]
    #[case(1023, 0)]
    fn test_memory_data_segments(#[case] addr: i32, #[case] expected: i32) {
        let instance = memory_module();
        assert_eq!(call1(&instance, "load8", &[Value::I32(addr)]), Value::I32(expected));
    }

    #[test]
    fn test_memory_store_and_bounds() {
        let instance = memory_module();
        instance
            .invoke("store64", &[Value::I32(100), Value::I64(0x0102_0304_0506_0708)])
            .unwrap();
        assert_eq!(call1(&instance, "load8", &[Value::I32(104)]), Value::I32(8));
        assert_eq!(call1(&instance, "load8", &[Value::I32(111)]), Value::I32(1));

        let memory = instance.memory("memory").unwrap();
        assert_eq!(memory.borrow().read_u64(104).unwrap(), 0x0102_0304_0506_0708);

        assert!(matches!(
            instance.invoke("load8", &[Value::I32(65536)]),
            Err(RuntimeError::MemoryError(_))
        ));
        assert!(matches!(
            instance.invoke("store64", &[Value::I32(65530), Value::I64(1)]),
            Err(RuntimeError::MemoryError(_))
        ));
    }

    // =======================================================================
    // Tables and indirect calls
    // =======================================================================

    fn table_module() -> Instance {
        let mut mb = ModuleBuilder::new();
        let table = mb.table(10, None);
        let a = constant_function(&mut mb, 65);
        let b = constant_function(&mut mb, 66);

        let mut f = mb.function(&[ValueType::I32]);
        let x = f.param(ValueType::I32).unwrap();
        f.push(Expr::local(x)).unwrap();
        let identity = f.finish().unwrap();

        mb.elements(table, 7, &[a]).unwrap();
        mb.elements(table, 9, &[b]).unwrap();
        mb.elements(table, 8, &[identity]).unwrap();

        let nullary = mb.signature(Vec::<ValueType>::new(), vec![ValueType::I32]);
        let mut f = mb.function(&[ValueType::I32]);
        let slot = f.param(ValueType::I32).unwrap();
        f.push(Expr::call_indirect(&nullary, table, Expr::local(slot), Vec::new()).unwrap())
            .unwrap();
        let dispatch = f.finish().unwrap();
        mb.export_function("dispatch", &dispatch).unwrap();
        instantiate(mb)
    }

    #[rstest]
    #[case(7, 65)]
    #[case(9, 66)]
    fn test_table_dispatch(#[case] slot: i32, #[case] expected: i32) {
        let instance = table_module();
        assert_eq!(call1(&instance, "dispatch", &[Value::I32(slot)]), Value::I32(expected));
    }

    #[test]
    fn test_indirect_call_failures() {
        let instance = table_module();
        assert!(matches!(
            instance.invoke("dispatch", &[Value::I32(8)]),
            Err(RuntimeError::IndirectCallTypeMismatch { .. })
        ));
        assert!(matches!(
            instance.invoke("dispatch", &[Value::I32(0)]),
            Err(RuntimeError::UndefinedElement(0))
        ));
        assert!(matches!(
            instance.invoke("dispatch", &[Value::I32(10)]),
            Err(RuntimeError::TableIndexOutOfBounds(10))
        ));
    }

    // =======================================================================
    // Imports, globals and the start function
    // =======================================================================

    #[test]
    fn test_host_function_import() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);

        let mut imports = ImportObject::new();
        imports.add_function(
            "env",
            "double",
            HostFunc::new(&[ValueType::I32], &[ValueType::I32], move |args| {
                log.borrow_mut().push(args[0]);
                let x = args[0].as_i32().unwrap_or_default();
                Ok(vec![Value::I32(x * 2)])
            }),
        );

        let mut mb = ModuleBuilder::new();
        let double = mb
            .import_function("env", "double", &[ValueType::I32], &[ValueType::I32])
            .unwrap();
        let mut f = mb.function(&[ValueType::I32]);
        let x = f.param(ValueType::I32).unwrap();
        let once = Expr::call(&double, vec![Expr::local(x)]).unwrap();
        f.push(Expr::call(&double, vec![once]).unwrap()).unwrap();
        let quadruple = f.finish().unwrap();
        mb.export_function("quadruple", &quadruple).unwrap();
        mb.export_function("double", &double).unwrap();
        let instance = instantiate_with(mb, &imports);

        assert_eq!(call1(&instance, "quadruple", &[Value::I32(5)]), Value::I32(20));
        assert_eq!(call1(&instance, "double", &[Value::I32(7)]), Value::I32(14));
        assert_eq!(*seen.borrow(), vec![Value::I32(5), Value::I32(10), Value::I32(7)]);
    }

    #[test]
    fn test_host_error_propagates() {
        let mut imports = ImportObject::new();
        imports.add_function(
            "env",
            "fail",
            HostFunc::new(&[], &[], |_| Err(RuntimeError::Trap("host refused".to_string()))),
        );
        let mut mb = ModuleBuilder::new();
        let fail = mb.import_function("env", "fail", &[], &[]).unwrap();
        let mut f = mb.function(&[]);
        f.call_stmt(&fail, Vec::new()).unwrap();
        let run = f.finish().unwrap();
        mb.export_function("run", &run).unwrap();
        let instance = instantiate_with(mb, &imports);

        let err = instance.invoke("run", &[]).unwrap_err();
        assert_eq!(err.to_string(), "Trap: host refused");
    }

    #[test]
    fn test_start_function_and_shared_global() {
        let shared = SharedGlobal::new(ValueType::I64, true, Value::I64(5)).unwrap();
        let mut imports = ImportObject::new();
        imports.add_global("env", "counter", shared.clone());

        let mut mb = ModuleBuilder::new();
        let counter = mb.import_global("env", "counter", ValueType::I64, true).unwrap();
        let local = mb.global(ValueType::I32, true, Value::I32(0)).unwrap();

        let mut f = mb.function(&[]);
        f.global_set(
            counter,
            Expr::binary(BinaryOp::Mul, Expr::global(counter), Expr::i64(10)).unwrap(),
        )
        .unwrap();
        f.global_set(local, Expr::i32(42)).unwrap();
        let init = f.finish().unwrap();
        mb.start(&init).unwrap();
        mb.export_global("local", local).unwrap();
        let instance = instantiate_with(mb, &imports);

        assert_eq!(shared.get(), Value::I64(50));
        assert_eq!(instance.global("local").unwrap().get(), Value::I32(42));
    }

    #[test]
    fn test_bool_parameter_accepts_i32() {
        let mut mb = ModuleBuilder::new();
        let mut f = mb.function(&[ValueType::I32]);
        let flag = f.param(ValueType::Bool).unwrap();
        f.push(Expr::select(Expr::local(flag), Expr::i32(1), Expr::i32(2)).unwrap())
            .unwrap();
        let pick = f.finish().unwrap();
        mb.export_function("pick", &pick).unwrap();
        let instance = instantiate(mb);

        assert_eq!(call1(&instance, "pick", &[Value::from(true)]), Value::I32(1));
        assert_eq!(call1(&instance, "pick", &[Value::I32(0)]), Value::I32(2));
    }

    /// `[select(flag, 1, 0), flag == true, flag and true]` as i32s.
    /// The flag is a parameter, or the result of the function `source_of`
    /// adds.
    fn bool_views(mb: &mut ModuleBuilder, source_of: impl FnOnce(&mut ModuleBuilder) -> Option<Func>) {
        let source = source_of(&mut *mb);
        let mut f = mb.function(&[ValueType::I32, ValueType::I32, ValueType::I32]);
        let flag = match &source {
            Some(_) => f.local(ValueType::Bool).unwrap(),
            None => f.param(ValueType::Bool).unwrap(),
        };
        if let Some(source) = &source {
            f.set(flag, Expr::call(source, Vec::new()).unwrap()).unwrap();
        }
        f.push(Expr::select(Expr::local(flag), Expr::i32(1), Expr::i32(0)).unwrap())
            .unwrap();
        let eq = Expr::compare(RelOp::Eq, Expr::local(flag), Expr::bool(true)).unwrap();
        f.push(Expr::bool_to_i32(eq).unwrap()).unwrap();
        let and = Expr::binary(BinaryOp::And, Expr::local(flag), Expr::bool(true)).unwrap();
        f.push(Expr::bool_to_i32(and).unwrap()).unwrap();
        let views = f.finish().unwrap();
        mb.export_function("views", &views).unwrap();
    }

    #[rstest]
    #[case(2)]
    #[case(-1)]
    fn test_bool_parameter_rejects_other_i32(#[case] raw: i32) {
        let mut mb = ModuleBuilder::new();
        bool_views(&mut mb, |_| None);
        let instance = instantiate(mb);

        assert_eq!(
            instance.invoke("views", &[Value::I32(1)]).unwrap(),
            vec![Value::I32(1), Value::I32(1), Value::I32(1)]
        );
        assert_eq!(
            instance.invoke("views", &[Value::I32(0)]).unwrap(),
            vec![Value::I32(0), Value::I32(0), Value::I32(0)]
        );
        let err = instance.invoke("views", &[Value::I32(raw)]).unwrap_err();
        assert!(matches!(err, RuntimeError::TypeMismatch { .. }));
        assert_eq!(err.to_string(), format!("Type mismatch: expected bool, got i32:{raw}"));
    }

    #[test]
    fn test_host_bool_result_checked_against_import() {
        // The host declares i32, which links against a bool import by
        // encoding; its results are still held to the import's type.
        let mut imports = ImportObject::new();
        imports.add_function("env", "flag", HostFunc::new(&[], &[ValueType::I32], |_| Ok(vec![Value::I32(2)])));

        let mut mb = ModuleBuilder::new();
        bool_views(&mut mb, |mb| {
            Some(mb.import_function("env", "flag", &[], &[ValueType::Bool]).unwrap())
        });
        let instance = instantiate_with(mb, &imports);

        assert!(matches!(
            instance.invoke("views", &[]),
            Err(RuntimeError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_bool_global_boundaries() {
        let mut mb = ModuleBuilder::new();
        assert!(matches!(
            mb.global(ValueType::Bool, false, Value::I32(2)),
            Err(BuildError::TypeMismatch { .. })
        ));
        assert!(mb.global(ValueType::Bool, false, Value::I32(1)).is_ok());

        let shared = SharedGlobal::new(ValueType::Bool, true, Value::I32(0)).unwrap();
        assert!(matches!(shared.set(Value::I32(2)), Err(RuntimeError::TypeMismatch { .. })));
        assert!(SharedGlobal::new(ValueType::Bool, true, Value::I32(5)).is_err());

        // A mutable i32 host global could later hold anything.
        let mut mb = ModuleBuilder::new();
        mb.import_global("env", "flag", ValueType::Bool, true).unwrap();
        let module = mb.finish().unwrap();
        let mut imports = ImportObject::new();
        imports.add_global("env", "flag", SharedGlobal::new(ValueType::I32, true, Value::I32(1)).unwrap());
        assert!(matches!(
            Instance::new(module.clone(), &imports),
            Err(RuntimeError::ImportTypeMismatch { .. })
        ));

        let mut imports = ImportObject::new();
        imports.add_global("env", "flag", shared);
        assert!(Instance::new(module.clone(), &imports).is_ok());

        let mut imports = ImportObject::new();
        imports.add_global("env", "flag", SharedGlobal::new(ValueType::I32, false, Value::I32(2)).unwrap());
        let mut mb = ModuleBuilder::new();
        mb.import_global("env", "flag", ValueType::Bool, false).unwrap();
        assert!(matches!(
            Instance::new(mb.finish().unwrap(), &imports),
            Err(RuntimeError::ImportTypeMismatch { .. })
        ));
    }
}
