#[cfg(test)]
mod interpreter_tests {
    use treelox as lox;

    use lox::error::{LoxError, RuntimeErrorKind};
    use lox::interpreter::Interpreter;
    use lox::output::CaptureOutput;

    fn interpret(interpreter: Interpreter, source: &str) -> (String, Result<(), Vec<LoxError>>) {
        let out = CaptureOutput::new();
        let mut interpreter = interpreter.with_output(Box::new(out.clone()));

        let result = lox::run(&mut interpreter, source.as_bytes());

        (out.contents(), result)
    }

    fn run_ok(source: &str) -> String {
        let (output, result) = interpret(Interpreter::new(), source);

        if let Err(errors) = result {
            panic!("program failed: {:?}", errors);
        }

        output
    }

    /// Runs a program expected to fail with exactly one error.
    fn run_err(source: &str) -> (String, LoxError) {
        let (output, result) = interpret(Interpreter::new(), source);
        let mut errors = result.expect_err("program should fail");

        assert_eq!(errors.len(), 1, "expected one error, got {:?}", errors);

        (output, errors.remove(0))
    }

    #[test]
    fn test_arithmetic_and_strings() {
        assert_eq!(run_ok("print 1 + 2;"), "3\n");
        assert_eq!(run_ok("print \"a\" + \"b\";"), "ab\n");
        assert_eq!(run_ok("print 10 / 4; print -3 * 2; print 7 - 0.5;"), "2.5\n-6\n6.5\n");
        assert_eq!(run_ok("print 2 > 1; print 2 <= 1; print !nil;"), "true\nfalse\ntrue\n");
    }

    #[test]
    fn test_type_errors() {
        let (_, err) = run_err("print 1 + \"a\";");
        assert_eq!(err.runtime_kind(), Some(RuntimeErrorKind::Type));
        assert_eq!(
            err.to_string(),
            "Operands must be two numbers or two strings.\n[line 1]"
        );

        let (_, err) = run_err("print -\"a\";");
        assert_eq!(err.to_string(), "Operand must be a number.\n[line 1]");

        let (_, err) = run_err("\n\nprint 1 < true;");
        assert_eq!(err.to_string(), "Operands must be numbers.\n[line 3]");
        assert_eq!(err.exit_code(), 70);
    }

    #[test]
    fn test_equality_and_truthiness() {
        let output = run_ok(
            "print nil == nil; print nil == false; print 1 == 1; print \"a\" == \"a\";
             print 0 == \"0\"; fun f() {} print f == f;
             class A {} print A() == A(); var a = A(); print a == a;",
        );
        assert_eq!(output, "true\nfalse\ntrue\ntrue\nfalse\ntrue\nfalse\ntrue\n");

        assert_eq!(
            run_ok("if (0) print \"zero\"; if (\"\") print \"empty\"; if (nil) print \"nil\";"),
            "zero\nempty\n"
        );
    }

    #[test]
    fn test_logical_operators_yield_operands() {
        assert_eq!(
            run_ok("print nil or \"x\"; print 1 and 2; print false and undefined; print 1 or undefined;"),
            "x\n2\nfalse\n1\n"
        );
    }

    #[test]
    fn test_stringification() {
        assert_eq!(
            run_ok(
                "print clock; fun f() {} print f; print fun () {}; class A {} print A; print A(); print nil;"
            ),
            "<native fn>\n<fn f>\n<fn>\nA\nA instance\nnil\n"
        );
    }

    #[test]
    fn test_clock() {
        assert_eq!(run_ok("var t = clock(); print t > 1000000000;"), "true\n");
    }

    #[test]
    fn test_global_assignment() {
        let (_, err) = run_err("x = 1;");
        assert_eq!(err.runtime_kind(), Some(RuntimeErrorKind::UndefinedVariable));
        assert_eq!(err.to_string(), "Undefined variable 'x'.\n[line 1]");

        assert_eq!(run_ok("var x; x = 1; print x;"), "1\n");

        let (_, err) = run_err("print y;");
        assert_eq!(err.to_string(), "Undefined variable 'y'.\n[line 1]");
    }

    #[test]
    fn test_unassigned_variables() {
        assert_eq!(run_ok("var a; print a;"), "nil\n");
        assert_eq!(run_ok("{ var a; print a; }"), "nil\n");

        let (output, result) =
            interpret(Interpreter::new().strict_unassigned(true), "print 1; var a; print a;");
        let errors = result.unwrap_err();

        assert_eq!(output, "1\n");
        assert_eq!(errors[0].runtime_kind(), Some(RuntimeErrorKind::UndefinedVariable));
        assert_eq!(
            errors[0].to_string(),
            "Attempted to access unassigned variable 'a'.\n[line 1]"
        );
    }

    #[test]
    fn test_block_scoping_and_shadowing() {
        assert_eq!(
            run_ok("var a = 1; { var a = 2; { var a = 3; print a; } print a; } print a;"),
            "3\n2\n1\n"
        );
    }

    #[test]
    fn test_closure_binds_at_definition() {
        assert_eq!(
            run_ok(
                "var a = \"global\"; { fun f() { print a; } f(); var a = \"block\"; f(); print a; }"
            ),
            "global\nglobal\nblock\n"
        );
    }

    #[test]
    fn test_closures_share_captured_frames() {
        let output = run_ok(
            "var inc; var get;
             { var n = 0; fun i() { n = n + 1; } fun g() { return n; } inc = i; get = g; }
             inc(); inc(); print get();",
        );
        assert_eq!(output, "2\n");

        let output = run_ok(
            "fun counter() { var c = 0; fun next() { c = c + 1; return c; } return next; }
             var a = counter(); var b = counter();
             print a(); print a(); print b();",
        );
        assert_eq!(output, "1\n2\n1\n");
    }

    #[test]
    fn test_loop_closures_capture_the_loop_variable() {
        let shared = run_ok(
            "var f0; var f1;
             for (var i = 0; i < 2; i = i + 1) {
               if (i == 0) f0 = fun () { print i; }; else f1 = fun () { print i; };
             }
             f0(); f1();",
        );
        assert_eq!(shared, "2\n2\n");

        let fresh = run_ok(
            "var f0; var f1;
             for (var i = 0; i < 2; i = i + 1) {
               var j = i;
               if (j == 0) f0 = fun () { print j; }; else f1 = fun () { print j; };
             }
             f0(); f1();",
        );
        assert_eq!(fresh, "0\n1\n");
    }

    #[test]
    fn test_control_flow() {
        assert_eq!(
            run_ok("var i = 0; while (i < 3) { print i; i = i + 1; }"),
            "0\n1\n2\n"
        );
        assert_eq!(
            run_ok("for (var i = 0; i < 3; i = i + 1) if (i == 1) print \"one\"; else print i;"),
            "0\none\n2\n"
        );
        assert_eq!(
            run_ok("fun f() { while (true) { for (;;) { return \"out\"; } } } print f();"),
            "out\n"
        );
    }

    #[test]
    fn test_recursion() {
        assert_eq!(
            run_ok("fun fib(n) { if (n < 2) return n; return fib(n - 1) + fib(n - 2); } print fib(10);"),
            "55\n"
        );
    }

    #[test]
    fn test_return_without_value_is_nil() {
        assert_eq!(run_ok("fun f() { return; } fun g() {} print f(); print g();"), "nil\nnil\n");
    }

    #[test]
    fn test_call_errors() {
        let (_, err) = run_err("\"s\"();");
        assert_eq!(err.runtime_kind(), Some(RuntimeErrorKind::NotCallable));
        assert_eq!(err.to_string(), "Can only call functions and classes.\n[line 1]");

        let (_, err) = run_err("fun f(a, b) {} f(1);");
        assert_eq!(err.runtime_kind(), Some(RuntimeErrorKind::Arity));
        assert_eq!(err.to_string(), "Expected 2 arguments but got 1.\n[line 1]");

        let (_, err) = run_err("clock(1);");
        assert_eq!(err.to_string(), "Expected 0 arguments but got 1.\n[line 1]");
    }

    #[test]
    fn test_arguments_evaluate_left_to_right() {
        assert_eq!(
            run_ok("fun p(x) { print x; return x; } fun f(a, b, c) {} f(p(1), p(2), p(3));"),
            "1\n2\n3\n"
        );
    }

    #[test]
    fn test_classes_and_fields() {
        let output = run_ok(
            "class Point {
               init(x, y) { this.x = x; this.y = y; }
               sum() { return this.x + this.y; }
             }
             var p = Point(1, 2);
             print p.sum();
             p.x = 10;
             print p.sum();
             var m = p.sum;
             print m();",
        );
        assert_eq!(output, "3\n12\n12\n");
    }

    #[test]
    fn test_constructor_returns_instance() {
        let output = run_ok(
            "class P { init(x) { this.x = x; return; } }
             var p = P(3);
             print p;
             print p.x;
             print p.init(4) == p;
             print p.x;",
        );
        assert_eq!(output, "P instance\n3\ntrue\n4\n");
    }

    #[test]
    fn test_class_without_init_has_zero_arity() {
        assert_eq!(run_ok("class A {} print A();"), "A instance\n");

        let (_, err) = run_err("class A {} A(1);");
        assert_eq!(err.runtime_kind(), Some(RuntimeErrorKind::Arity));
        assert_eq!(err.to_string(), "Expected 0 arguments but got 1.\n[line 1]");
    }

    #[test]
    fn test_fields_shadow_methods() {
        let output = run_ok(
            "class A { m() { return \"method\"; } }
             var a = A();
             print a.m();
             a.m = fun () { return \"field\"; };
             print a.m();
             print A().m();",
        );
        assert_eq!(output, "method\nfield\nmethod\n");
    }

    #[test]
    fn test_property_errors() {
        let (_, err) = run_err("class A {} print A().nope;");
        assert_eq!(err.runtime_kind(), Some(RuntimeErrorKind::UndefinedProperty));
        assert_eq!(err.to_string(), "Undefined property 'nope'.\n[line 1]");

        let (_, err) = run_err("var n = 1; print n.x;");
        assert_eq!(err.runtime_kind(), Some(RuntimeErrorKind::NotInstance));
        assert_eq!(err.to_string(), "Only instances have properties.\n[line 1]");

        let (_, err) = run_err("var n = 1; n.x = 2;");
        assert_eq!(err.to_string(), "Only instances have fields.\n[line 1]");
    }

    #[test]
    fn test_inheritance() {
        assert_eq!(
            run_ok("class A {} class B < A {} var b = B(); print b;"),
            "B instance\n"
        );

        let output = run_ok(
            "class A { hello() { return \"hello from A\"; } }
             class B < A {}
             class C < B {}
             print C().hello();",
        );
        assert_eq!(output, "hello from A\n");
    }

    #[test]
    fn test_super_binds_subclass_instance() {
        let output = run_ok(
            "class A {
               name() { return \"A\"; }
               greet() { print \"hi from \" + this.name(); }
             }
             class B < A {
               name() { return \"B\"; }
               greet() { print \"B says:\"; super.greet(); }
             }
             class C < B {}
             B().greet();
             C().greet();",
        );
        assert_eq!(output, "B says:\nhi from B\nB says:\nhi from B\n");
    }

    #[test]
    fn test_super_is_lexical() {
        // `super` inside B's method always means A, even when called on a C.
        let output = run_ok(
            "class A { m() { return \"A\"; } }
             class B < A { m() { return \"B>\" + super.m(); } }
             class C < B { m() { return \"C>\" + super.m(); } }
             print C().m();",
        );
        assert_eq!(output, "C>B>A\n");
    }

    #[test]
    fn test_inherited_initializer() {
        let output = run_ok(
            "class A { init(v) { this.v = v; } }
             class B < A { init(v) { super.init(v * 2); } }
             print B(21).v;",
        );
        assert_eq!(output, "42\n");
    }

    #[test]
    fn test_superclass_must_be_class() {
        let (_, err) = run_err("var x = 1; class B < x {}");
        assert_eq!(err.to_string(), "Superclass must be a class.\n[line 1]");
    }

    #[test]
    fn test_runtime_error_stops_execution() {
        let (output, err) = run_err("print 1; print -\"a\"; print 2;");

        assert_eq!(output, "1\n");
        assert!(!err.is_static());
    }

    #[test]
    fn test_static_errors_prevent_execution() {
        let (output, result) = interpret(Interpreter::new(), "print 1; @");
        assert_eq!(output, "");
        assert_eq!(
            result.unwrap_err()[0].to_string(),
            "[line 1] Error: Unexpected character: @"
        );

        let (output, result) = interpret(Interpreter::new(), "print 1; return 2; { var a = a; }");
        let errors = result.unwrap_err();
        assert_eq!(output, "");
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.is_static() && e.exit_code() == 65));
    }

    #[test]
    fn test_environment_restored_after_error() {
        let out = CaptureOutput::new();
        let mut interpreter = Interpreter::new().with_output(Box::new(out.clone()));

        assert!(lox::run(&mut interpreter, b"var a = 1; { var a = 2; nil(); }").is_err());
        assert!(lox::run(&mut interpreter, b"fun f() { var z = 1; nil(); } f();").is_err());

        lox::run(&mut interpreter, b"var b = 3; print a + b;").unwrap();

        assert_eq!(out.contents(), "4\n");
        assert!(interpreter.globals().borrow().get_local("b").is_some());
    }

    #[test]
    fn test_state_persists_between_runs() {
        let out = CaptureOutput::new();
        let mut interpreter = Interpreter::new().with_output(Box::new(out.clone()));

        lox::run(&mut interpreter, b"fun make() { var n = 0; fun f() { n = n + 1; return n; } return f; }").unwrap();
        lox::run(&mut interpreter, b"var counter = make();").unwrap();
        lox::run(&mut interpreter, b"counter(); print counter();").unwrap();

        assert_eq!(out.contents(), "2\n");
    }

    #[test]
    fn test_stack_overflow_is_a_runtime_error() {
        // Deep recursion needs more host stack than a test thread has by default.
        let handle = std::thread::Builder::new()
            .stack_size(64 * 1024 * 1024)
            .spawn(|| {
                let (output, result) = interpret(
                    Interpreter::new().max_call_depth(64),
                    "fun down(n) { print n; down(n + 1); } down(1);",
                );
                let errors = result.unwrap_err();

                assert_eq!(output.lines().count(), 64);
                assert_eq!(errors[0].runtime_kind(), Some(RuntimeErrorKind::StackOverflow));
                assert_eq!(errors[0].to_string(), "Stack overflow.\n[line 1]");
            })
            .unwrap();

        handle.join().unwrap();
    }

    #[test]
    fn test_deep_recursion_within_default_limit() {
        let handle = std::thread::Builder::new()
            .stack_size(256 * 1024 * 1024)
            .spawn(|| {
                run_ok(
                    "fun count(n) { if (n == 0) return 0; return 1 + count(n - 1); }\nprint count(1000);",
                )
            })
            .unwrap();

        assert_eq!(handle.join().unwrap(), "1000\n");
    }

    #[test]
    fn test_division_by_zero_prints_infinity() {
        assert_eq!(run_ok("print 1 / 0; print -1 / 0;"), "Infinity\n-Infinity\n");
    }
}
