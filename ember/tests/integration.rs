//! Integration tests for the Ember interpreter
//!
//! Programs run end to end through the lexer, the block resolver and the
//! engine, with output captured in memory and modules served from a
//! `MemoryLoader` unless a test says otherwise.

use ember::config::EngineConfig;
use ember::error::ErrorKind;
use ember::interp::{FileLoader, Interpreter, MemoryLoader, ModuleLoader, SharedOutput, Value};
use ember::lexer::{dump_statements, tokenize};

fn interpreter_with(loader: impl ModuleLoader + 'static, config: EngineConfig) -> (Interpreter, SharedOutput) {
    let out = SharedOutput::new();
    let interp = Interpreter::with_loader(config, Box::new(loader)).with_output(out.clone());
    (interp, out)
}

fn interpreter() -> (Interpreter, SharedOutput) {
    interpreter_with(MemoryLoader::new(), EngineConfig::default())
}

/// Run a program to completion and return what it printed
fn output(source: &str) -> String {
    let (mut interp, out) = interpreter();
    interp.run_source("test.ember", source).unwrap();
    interp.finish().unwrap();
    out.contents()
}

/// Kind of the error a program raises
fn error_kind(source: &str) -> ErrorKind {
    let (mut interp, _) = interpreter();
    interp
        .run_source("test.ember", source)
        .and_then(|_| interp.finish())
        .expect_err("program should fail")
        .kind
}

fn run_with(loader: MemoryLoader, source: &str) -> ember::Result<String> {
    let (mut interp, out) = interpreter_with(loader, EngineConfig::default());
    interp.run_source("test.ember", source)?;
    interp.finish()?;
    Ok(out.contents())
}

fn ints(items: &[i64]) -> Value {
    Value::list(items.iter().map(|n| Value::int(*n)).collect())
}

// ============================================
// Scope discipline
// ============================================

#[test]
fn test_blocks_restore_binding_count() {
    let (mut interp, _) = interpreter();
    interp.run_source("test.ember", "count := 0").unwrap();
    let before = interp.binding_count();

    interp
        .run_source(
            "test.ember",
            r#"
if true {
  a := 1
  b := 2
}
for _, i in [1, 2, 3] {
  t := i
  if i == 2 {
    u := t
    break
  }
  continue
}
func f() {
  for {
    z := 1
    ret z
  }
}
f()
try {
  if true {
    q := 1
    panic("inside")
  }
} catch {
  handled := true
}
"#,
        )
        .unwrap();
    assert_eq!(interp.binding_count(), before);
}

#[test]
fn test_closure_sees_module_binding() {
    let (mut interp, _) = interpreter();
    interp
        .run_source(
            "test.ember",
            r#"
x := 1
func g() {
  ret x
}
func f() {
  x := 2
  ret g()
}
r := f()
"#,
        )
        .unwrap();
    assert_eq!(interp.lookup("r"), Some(Value::int(1)));
}

#[test]
fn test_try_restores_frame_after_deep_raise() {
    let (mut interp, _) = interpreter();
    interp
        .run_source(
            "test.ember",
            r#"
caught := none
func inner(n) {
  local := n * 2
  panic("failed at " + string(n))
}
func outer(n) {
  temp := n
  ret inner(n)
}
"#,
        )
        .unwrap();
    let before = interp.binding_count();

    interp
        .run_source(
            "test.ember",
            r#"
try {
  for _, a in [1, 2] {
    for _, b in [3] {
      for _, c in [4] {
        sum := a + b + c
        outer(sum)
      }
    }
  }
} catch err {
  caught = err
}
"#,
        )
        .unwrap();
    assert_eq!(interp.binding_count(), before);
    assert_eq!(interp.lookup("caught"), Some(Value::str("failed at 8")));

    // Loop bookkeeping is restored too
    interp
        .run_source("test.ember", "for _, x in [1] {\n  break\n}")
        .unwrap();
}

#[test]
fn test_redeclaration_is_name_error() {
    assert_eq!(error_kind("x := 1\nx := 2"), ErrorKind::Name);
    assert_eq!(error_kind("func f() {\n  a := 1\n  var a = 2\n}\nf()"), ErrorKind::Name);
}

#[test]
fn test_undefined_name_suggests_close_match() {
    let (mut interp, _) = interpreter();
    let err = interp
        .run_source("test.ember", "total := 1\nprintln(totl)")
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Name);
    assert!(err.message().contains("did you mean 'total'"));
    assert_eq!(err.pos.as_ref().map(|p| p.line), Some(2));
}

// ============================================
// Arithmetic
// ============================================

#[test]
fn test_precedence() {
    let (mut interp, _) = interpreter();
    interp
        .run_source(
            "test.ember",
            "a := 2 + 3 * 4\nb := 2 ** 3 % 5\nc := 1 + 2 * 3 - 4 / 2\nd := (2 + 3) * 4",
        )
        .unwrap();
    assert_eq!(interp.lookup("a"), Some(Value::int(14)));
    assert_eq!(interp.lookup("b"), Some(Value::int(3)));
    assert_eq!(interp.lookup("c"), Some(Value::int(5)));
    assert_eq!(interp.lookup("d"), Some(Value::int(20)));
}

#[test]
fn test_broadcasting_commutes_for_plus_and_times() {
    let (mut interp, _) = interpreter();
    interp
        .run_source(
            "test.ember",
            r#"
p1 := 2 + [1, 2, 3]
p2 := [1, 2, 3] + 2
t1 := 3 * [1, 2]
t2 := [1, 2] * 3
m1 := 10 - [1, 2]
m2 := [10, 20] - 1
d1 := 12 / [3, 4]
d2 := [6, 8] / 2
"#,
        )
        .unwrap();
    assert_eq!(interp.lookup("p1"), interp.lookup("p2"));
    assert_eq!(interp.lookup("p1"), Some(ints(&[3, 4, 5])));
    assert_eq!(interp.lookup("t1"), interp.lookup("t2"));
    assert_eq!(interp.lookup("m1"), Some(ints(&[9, 8])));
    assert_eq!(interp.lookup("m2"), Some(ints(&[9, 19])));
    assert_eq!(interp.lookup("d1"), Some(ints(&[4, 3])));
    assert_eq!(interp.lookup("d2"), Some(ints(&[3, 4])));
}

#[test]
fn test_list_arithmetic() {
    let (mut interp, _) = interpreter();
    interp
        .run_source("test.ember", "xs := [1, 2, 3] + [10]\nys := [1, 2] + [3, 4]")
        .unwrap();
    assert_eq!(interp.lookup("xs"), Some(ints(&[11, 12, 13])));
    assert_eq!(interp.lookup("ys"), Some(ints(&[4, 6])));
    assert_eq!(error_kind("[1, 2] + [1, 2, 3]"), ErrorKind::Arithmetic);
}

#[test]
fn test_divide_by_zero() {
    assert_eq!(error_kind("5 / 0"), ErrorKind::DivideByZero);
    assert_eq!(error_kind("5 % 0"), ErrorKind::DivideByZero);
    assert_eq!(error_kind("5 // 0"), ErrorKind::DivideByZero);
    assert_eq!(error_kind("x := 0\ny := 1 / x"), ErrorKind::DivideByZero);
}

#[test]
fn test_arithmetic_type_errors() {
    assert_eq!(error_kind("\"a\" - \"b\""), ErrorKind::Arithmetic);
    assert_eq!(error_kind("\"a\" + 1"), ErrorKind::Arithmetic);
    assert_eq!(error_kind("none + 1"), ErrorKind::Arithmetic);
    assert_eq!(error_kind("1 << -1"), ErrorKind::Arithmetic);
}

#[test]
fn test_number_formatting() {
    let out = output(
        r#"
println(7 / 2)
println(7 // 2)
println(1 / 3)
println(2 ** 10)
println(2 ** -1)
println(10 % 3)
println(1 << 4)
println(0x10 + 1)
println(1.5 + 1)
println(3.0)
println(0.1 + 0.2 == 0.3)
println("sum:", 1 + 2)
"#,
    );
    insta::assert_snapshot!(out.trim_end(), @r###"
    3.5
    3
    0.3333333333333333
    1024
    0.5
    1
    16
    17
    2.5
    3.0
    true
    sum: 3
    "###);
}

#[test]
fn test_value_formatting() {
    let out = output(
        r#"
struct Pair { left, right }
println([1, "x", none, true])
println({"k": [1.0], "n": {}})
println(Pair(1, "two"))
println(func(a) {
  ret a
})
println(type(1), type(1.0), type("s"), type([]), type({}), type(none))
"#,
    );
    insta::assert_snapshot!(out.trim_end(), @r###"
    [1, "x", none, true]
    {"k": [1.0], "n": {}}
    Pair{left: 1, right: "two"}
    <func <anonymous>>
    int float str list map none
    "###);
}

// ============================================
// Comparison and truthiness
// ============================================

#[test]
fn test_truthiness_is_strict() {
    let out = output(
        r#"
if 1 {
  println("int is true")
} else {
  println("only true is true")
}
if true && !false {
  println("bool")
}
"#,
    );
    assert_eq!(out, "only true is true\nbool\n");
}

#[test]
fn test_comparisons() {
    let (mut interp, _) = interpreter();
    interp
        .run_source(
            "test.ember",
            r#"
a := "1" == 1
b := 1 == 1.0
c := "abc" < "abd"
d := [1, [2]] == [1, [2]]
e := 2 in [1, 2]
f := "ell" in "hello"
g := "k" in {"k": 1}
h := 1 < 2 && 2 < 1 || 3 >= 3
"#,
        )
        .unwrap();
    let expected = [
        ("a", false),
        ("b", true),
        ("c", true),
        ("d", true),
        ("e", true),
        ("f", true),
        ("g", true),
        ("h", true),
    ];
    for (name, value) in expected {
        assert_eq!(interp.lookup(name), Some(Value::Bool(value)), "{name}");
    }
    assert_eq!(error_kind("[1] < [2]"), ErrorKind::Value);
}

// ============================================
// Control flow
// ============================================

#[test]
fn test_if_else_chain() {
    let out = output(
        r#"
func grade(n) {
  if n >= 90 {
    ret "A"
  } else if n >= 80 {
    ret "B"
  } else {
    ret "C"
  }
}
println(grade(95), grade(85), grade(10))
"#,
    );
    assert_eq!(out, "A B C\n");
}

#[test]
fn test_loops() {
    let out = output(
        r#"
i := 0
for i < 3 {
  i += 1
}
println(i)
for idx in ["a", "b"] {
  print(idx)
}
println()
for _, x in [] {
  println(x)
} else {
  println("empty")
}
m := {"a": 1, "b": 2}
for k, v in m {
  println(k, v)
}
for _, ch in "hi" {
  print(ch, "")
}
println()
"#,
    );
    assert_eq!(out, "3\n01\nempty\na 1\nb 2\nh i \n");
}

#[test]
fn test_break_outside_loop_is_syntax_error() {
    assert_eq!(error_kind("break"), ErrorKind::Syntax);
    assert_eq!(error_kind("ret 1"), ErrorKind::Syntax);
}

#[test]
fn test_comprehensions() {
    let (mut interp, _) = interpreter();
    interp
        .run_source(
            "test.ember",
            r#"
evens := [x * x for x in range(1, 5), x % 2 == 0]
keys := [k for k in {"x": 1, "y": 2}]
chars := [c + c for c in "ab"]
"#,
        )
        .unwrap();
    assert_eq!(interp.lookup("evens"), Some(ints(&[4, 16])));
    assert_eq!(
        interp.lookup("keys"),
        Some(Value::list(vec![Value::str("x"), Value::str("y")]))
    );
    assert_eq!(
        interp.lookup("chars"),
        Some(Value::list(vec![Value::str("aa"), Value::str("bb")]))
    );
}

// ============================================
// Functions
// ============================================

#[test]
fn test_keyword_then_positional_is_syntax_error() {
    assert_eq!(
        error_kind("func f(a, b) {\n  ret a\n}\nf(a = 1, 2)"),
        ErrorKind::Syntax
    );
}

#[test]
fn test_defaults_keywords_and_variadics() {
    let out = output(
        r#"
func greet(name, greeting = "Hello", ...rest) {
  ret greeting + ", " + name + " " + string(len(rest))
}
println(greet("Ann"))
println(greet("Bob", greeting = "Hi"))
println(greet("Cy", "Yo", 1, 2))
func sum(...xs) {
  total := 0
  for _, x in xs {
    total += x
  }
  ret total
}
nums := [1, 2, 3]
println(sum(nums...), sum())
"#,
    );
    assert_eq!(out, "Hello, Ann 0\nHi, Bob 0\nYo, Cy 2\n6 0\n");
}

#[test]
fn test_missing_argument_is_plain_error() {
    assert_eq!(error_kind("func f(a) {\n  ret a\n}\nf()"), ErrorKind::Plain);
}

#[test]
fn test_recursion() {
    let out = output(
        r#"
func fib(n) {
  if n < 2 {
    ret n
  }
  ret fib(n - 1) + fib(n - 2)
}
func outer() {
  func countdown(n) {
    if n == 0 {
      ret "done"
    }
    ret countdown(n - 1)
  }
  ret countdown(3)
}
println(fib(15), outer())
"#,
    );
    assert_eq!(out, "610 done\n");
}

#[test]
fn test_call_depth_limit() {
    let (mut interp, _) = interpreter_with(MemoryLoader::new(), EngineConfig::default().max_call_depth(50));
    let err = interp
        .run_source("test.ember", "func down(n) {\n  ret down(n + 1)\n}\ndown(0)")
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Memory);
}

#[test]
fn test_closures_capture_function_locals() {
    let out = output(
        r#"
func makeAdder(n) {
  ret func(x) {
    ret x + n
  }
}
add5 := makeAdder(5)
add1 := makeAdder(1)
println(add5(10), add1(10))
"#,
    );
    assert_eq!(out, "15 11\n");
}

// ============================================
// Bindings and mutability
// ============================================

#[test]
fn test_mut_aliases_and_var_copies() {
    let (mut interp, _) = interpreter();
    interp
        .run_source(
            "test.ember",
            r#"
a := [1]
mut b = a
b.pushBack(2)
var c = a
c.pushBack(3)
"#,
        )
        .unwrap();
    assert_eq!(interp.lookup("a"), Some(ints(&[1, 2])));
    assert_eq!(interp.lookup("c"), Some(ints(&[1, 2, 3])));
}

#[test]
fn test_constants_and_frozen_values() {
    assert_eq!(error_kind("const limit = 3\nlimit = 4"), ErrorKind::Syntax);
    assert_eq!(error_kind("frozen := immut([1, 2])\nfrozen.pushBack(3)"), ErrorKind::Value);
    assert_eq!(error_kind("frozen := immut({\"a\": 1})\nfrozen[\"b\"] = 2"), ErrorKind::Value);
    // A constant's contents stay mutable unless frozen
    assert_eq!(output("const xs = [1]\nxs.pushBack(2)\nprintln(xs)"), "[1, 2]\n");
}

#[test]
fn test_grouped_declaration() {
    let (mut interp, _) = interpreter();
    interp
        .run_source("test.ember", "var (\n  a = 1\n  b = a + 1\n)")
        .unwrap();
    assert_eq!(interp.lookup("b"), Some(Value::int(2)));
}

#[test]
fn test_strings_and_indexing() {
    let out = output(
        r#"
s := "hello"
println(s[1], s[-1], s.upper(), len(s))
s[0] = "j"
println(s)
xs := [1, 2, 3]
xs[-1] = 30
println(xs, xs.sub(1, 2))
m := {"a": 1}
m["b"] = 2
println(m, m.keys())
"#,
    );
    assert_eq!(out, "e o HELLO 5\njello\n[1, 2, 30] [2, 30]\n{\"a\": 1, \"b\": 2} [\"a\", \"b\"]\n");
    assert_eq!(error_kind("xs := [1]\nxs[5]"), ErrorKind::OutOfRange);
}

#[test]
fn test_method_arguments_may_alias_receiver() {
    let out = output(
        r#"
xs := [[1]]
println(xs.remove(xs), xs.removeAll(xs), xs.index(xs), xs.removeLast(xs))
ys := [1, 0]
ys[ys] = 5
println(ys)
m := {"a": 1}
try {
  m.removeKey(m)
} catch e {
  println("no such key")
}
"#,
    );
    assert_eq!(out, "false 0 -1 false\n[5, 5]\nno such key\n");
}

#[test]
fn test_aggregates_cannot_contain_themselves() {
    let out = output(
        r#"
mut xs = [1]
try {
  xs.pushBack(xs)
} catch e {
  println(e)
}
try {
  xs.insert(0, [[xs]])
} catch e {
  println(e)
}
xs.pushBack(immut(xs))
println(len(xs), xs)
"#,
    );
    assert_eq!(
        out,
        "a list cannot contain itself\na list cannot contain itself\n2 [1, [1]]\n"
    );
    assert_eq!(error_kind("xs := [1]\nxs[0] = xs"), ErrorKind::Value);
    assert_eq!(error_kind("m := {\"k\": 1}\nm[\"k\"] = [m]"), ErrorKind::Value);
    assert_eq!(error_kind("struct S { v }\ns := S()\ns.v = [s]"), ErrorKind::Value);
}

#[test]
fn test_class_instance_referring_to_itself_prints() {
    let out = output("class Node {\n  var next\n}\nn := Node()\nn.next = n\nprintln(n)");
    assert_eq!(out, "Node{next: Node{...}}\n");
}

// ============================================
// try / defer / go
// ============================================

#[test]
fn test_defer_runs_last_first() {
    let out = output(
        r#"
func d(n) {
  println(n)
}
func work() {
  defer d(1)
  defer d(2)
  defer d(3)
  println("body")
}
work()
"#,
    );
    assert_eq!(out, "body\n3\n2\n1\n");
}

#[test]
fn test_defer_runs_on_error_before_catch() {
    let out = output(
        r#"
func risky() {
  defer println("cleanup")
  panic("boom")
}
try {
  risky()
} catch e {
  println("caught", e)
}
try {
  panic("ignored")
}
println("after")
"#,
    );
    assert_eq!(out, "cleanup\ncaught boom\nafter\n");
}

#[test]
fn test_error_in_catch_propagates() {
    assert_eq!(
        error_kind("try {\n  panic(\"a\")\n} catch {\n  1 / 0\n}"),
        ErrorKind::DivideByZero
    );
}

#[test]
fn test_program_defers_run_when_program_fails() {
    let (mut interp, out) = interpreter();
    let err = interp
        .run_source(
            "test.ember",
            "defer println(\"first\")\ndefer println(\"cleanup\")\npanic(\"boom\")\nprintln(\"unreached\")",
        )
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Plain);
    assert_eq!(out.contents(), "cleanup\nfirst\n");
    interp.finish().unwrap();
    assert_eq!(out.contents(), "cleanup\nfirst\n");
}

#[test]
fn test_detached_calls_run_after_statement() {
    let out = output(
        r#"
func worker(n) {
  println("worker", n)
}
func launch() {
  go worker(1)
  println("launched")
}
launch()
println("after")
"#,
    );
    assert_eq!(out, "launched\nworker 1\nafter\n");
}

// ============================================
// Records
// ============================================

#[test]
fn test_structs() {
    let out = output(
        r#"
struct Point { x, y }
p := Point(1, y = 2)
p.x = 10
println(p, p.y)
q := Point()
println(q.x)
"#,
    );
    assert_eq!(out, "Point{x: 10, y: 2} 2\nnone\n");
    assert_eq!(error_kind("struct P { x }\np := P()\np.z"), ErrorKind::Name);
}

#[test]
fn test_classes() {
    let out = output(
        r#"
class Counter {
  var count = 0
  func Counter(start) {
    this.count = start
  }
  func inc(by = 1) {
    this.count += by
    ret this.count
  }
}
c := Counter(5)
c.inc()
println(c.inc(10), c.count)
println(c)
"#,
    );
    assert_eq!(out, "16 16\nCounter{count: 16}\n");
}

#[test]
fn test_class_without_constructor_takes_no_arguments() {
    assert_eq!(error_kind("class Empty {\n  var x\n}\nEmpty(1)"), ErrorKind::Syntax);
    assert_eq!(output("class Empty {\n  var x\n}\nprintln(Empty().x)"), "none\n");
}

// ============================================
// Modules
// ============================================

#[test]
fn test_open_module_and_alias() {
    let loader = MemoryLoader::new().with(
        "geometry",
        "Scale := 2\nfunc Area(w, h) {\n  ret w * h * Scale\n}\nsecret := 1",
    );
    let out = run_with(
        loader.clone(),
        "open geometry\nprintln(geometry.Area(2, 3))\nopen g geometry\nprintln(g.Scale)",
    )
    .unwrap();
    assert_eq!(out, "12\n2\n");

    let err = run_with(loader, "open geometry\ngeometry.secret").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Name);
}

#[test]
fn test_nested_modules_load_in_dependency_order() {
    let loader = MemoryLoader::new()
        .with("a", "open b\nX := b.Y + 1")
        .with("b", "Y := 1\nprintln(\"b loaded\")");
    let out = run_with(loader, "open a\nprintln(a.X)").unwrap();
    assert_eq!(out, "b loaded\n2\n");
}

#[test]
fn test_import_cycle_is_rejected() {
    let loader = MemoryLoader::new().with("a", "open b").with("b", "open a");
    let err = run_with(loader, "open a").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Plain);
    assert!(err.message().contains("import cycle: a -> b -> a"), "{}", err.message());
}

#[test]
fn test_missing_module() {
    let err = run_with(MemoryLoader::new(), "open nothing").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Name);
}

#[test]
fn test_import_module_directly() {
    let loader = MemoryLoader::new().with("util", "Answer := 42");
    let (mut interp, _) = interpreter_with(loader, EngineConfig::default());
    let scope = interp.import_module("util").unwrap();
    assert_eq!(scope.name, "util");
    assert_eq!(scope.binding_count(), 1);
}

#[test]
fn test_file_loader() {
    let dir = std::env::temp_dir().join(format!("ember-modules-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("consts.ember"), "Answer := 42\n").unwrap();

    let out = SharedOutput::new();
    let loader = FileLoader::new(vec![dir.clone()], "ember");
    let mut interp = Interpreter::with_loader(EngineConfig::default(), Box::new(loader))
        .with_output(out.clone());
    interp
        .run_source("test.ember", "open consts\nprintln(consts.Answer)")
        .unwrap();
    assert_eq!(out.contents(), "42\n");

    std::fs::remove_dir_all(&dir).ok();
}

// ============================================
// Lexer
// ============================================

#[test]
fn test_token_dump() {
    let statements = tokenize("t.ember", "x := 0x1F # hex\nprint(\"hi\")").unwrap();
    insta::assert_snapshot!(dump_statements(&statements).trim_end(), @r###"
    statement 1
      1:1 Ident "x"
      1:3 Define ":="
      1:6 Int "31"
    statement 2
      2:1 Ident "print"
      2:6 LParen "("
      2:7 Str "hi"
      2:11 RParen ")"
    "###);
}

#[test]
fn test_unclosed_block_is_syntax_error() {
    assert_eq!(error_kind("func f() {\n  ret 1\n"), ErrorKind::Syntax);
    assert_eq!(error_kind("/* never closed"), ErrorKind::Syntax);
}
