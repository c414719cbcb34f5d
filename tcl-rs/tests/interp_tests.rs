/// Integration tests against a real Tcl library.
///
/// Every test obtains its interpreter through `interp()`, which returns
/// `None` when `libtcl` cannot be loaded (set `TCL_RS_LIBRARY` to point at
/// it explicitly).  Such tests print a note and pass without checking
/// anything.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use tcl::{CommandError, Error, Interp, State, VarKind};

// ── Helpers ───────────────────────────────────────────────────────────────────

fn interp() -> Option<Interp> {
    match Interp::new() {
        Ok(i) => Some(i),
        Err(Error::Load(e)) => {
            eprintln!("skipping: {e}");
            None
        }
        Err(e) => panic!("cannot create interpreter: {e}"),
    }
}

macro_rules! interp_or_skip {
    () => {
        match interp() {
            Some(i) => i,
            None => return,
        }
    };
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|&s| s.to_owned()).collect()
}

fn is_eval_error(r: tcl::Result<String>) -> bool {
    matches!(r, Err(Error::Eval(_)))
}

// ── eval ──────────────────────────────────────────────────────────────────────

#[test]
fn eval_returns_result_string() {
    let i = interp_or_skip!();
    assert_eq!(i.eval("").unwrap(), "");
    assert_eq!(i.eval("return 0").unwrap(), "0");
    assert_eq!(i.eval("return \"\"").unwrap(), "");
    assert_eq!(i.eval("return {}").unwrap(), "");
    assert_eq!(i.eval("return \" \"").unwrap(), " ");
    assert_eq!(i.eval("expr {6 * 7}").unwrap(), "42");
    assert_eq!(i.state(), State::Ready);
}

#[test]
fn eval_raises_on_tcl_error() {
    let i = interp_or_skip!();
    assert!(is_eval_error(i.eval("nonexistent")));
    assert!(is_eval_error(i.eval("{")));
    assert!(is_eval_error(i.eval("error")));
}

#[test]
fn eval_error_carries_tcl_text() {
    let i = interp_or_skip!();
    let err = i.eval("nonexistent").unwrap_err();
    assert_eq!(err.to_string(), "invalid command name \"nonexistent\"");
    let err = i.eval("error {custom failure}").unwrap_err();
    assert_eq!(err.eval_message(), Some("custom failure"));
}

#[test]
fn state_persists_between_evals() {
    let i = interp_or_skip!();
    i.eval("set greeting hello").unwrap();
    assert_eq!(i.eval("set greeting").unwrap(), "hello");
    let clone = i.clone();
    assert_eq!(clone.eval("string toupper $greeting").unwrap(), "HELLO");
}

#[test]
fn non_ascii_scripts() {
    let i = interp_or_skip!();
    assert_eq!(i.eval("return caf\u{e9}").unwrap(), "caf\u{e9}");
    assert_eq!(i.eval("string length caf\u{e9}").unwrap(), "4");
}

#[test]
fn break_outside_loop_is_an_error() {
    let i = interp_or_skip!();
    assert!(is_eval_error(i.eval("break")));
}

#[test]
fn custom_return_codes_surface_as_errors() {
    let i = interp_or_skip!();
    assert!(matches!(i.try_eval("return -code break"), Err(Error::Eval(_))));
    assert!(matches!(i.try_eval("return -code 5"), Err(Error::Eval(_))));
    assert_eq!(i.try_eval("return -code ok done").unwrap(), Some("done".to_owned()));
}

#[test]
fn embedded_nul_in_values() {
    let i = interp_or_skip!();
    assert_eq!(i.invoke(["set", "x", "a\0b"]).unwrap(), "a\0b");
    assert_eq!(i.eval("string length $x").unwrap(), "3");
    assert_eq!(i.eval("set x").unwrap(), "a\0b");
}

#[test]
fn embedded_nul_through_host_command() {
    let i = interp_or_skip!();
    i.expose("nul", |_, _| Ok("a\0b".into())).unwrap();
    i.expose("arg_len", |_, args| Ok(args[0].chars().count().to_string())).unwrap();
    assert_eq!(i.eval("nul").unwrap(), "a\0b");
    assert_eq!(i.eval("string length [nul]").unwrap(), "3");
    assert_eq!(i.eval("arg_len [nul]").unwrap(), "3");
    let words = strings(&["a\0b", "c"]);
    let list = i.array_to_list(&words);
    assert_eq!(i.list_to_array(&list), Some(words));
}

#[test]
fn supplementary_characters_after_string_ops() {
    let i = interp_or_skip!();
    assert_eq!(i.eval("string range \"x\u{1F600}\" 0 end").unwrap(), "x\u{1F600}");
    i.expose("echo", |_, args| Ok(args[0].clone())).unwrap();
    assert_eq!(i.eval("echo [string range \"\u{1F600}\" 0 end]").unwrap(), "\u{1F600}");
    assert_eq!(i.eval("echo [format %s \"\u{1F600}\"]").unwrap(), "\u{1F600}");
}

// ── List codec ────────────────────────────────────────────────────────────────

#[test]
fn array_to_list_fixtures() {
    let i = interp_or_skip!();
    assert_eq!(i.array_to_list([] as [&str; 0]), "");
    assert_eq!(i.array_to_list([None::<&str>]), "{}");
    assert_eq!(i.array_to_list([""]), "{}");
    assert_eq!(i.array_to_list(["one"]), "one");
    assert_eq!(i.array_to_list(["one", "two"]), "one two");
    assert_eq!(i.array_to_list(["a", " b", "c"]), "a { b} c");
    assert_eq!(i.array_to_list(["{"]), "\\{");
    assert_eq!(i.array_to_list(["\""]), "{\"}");
}

#[test]
fn array_to_list_mixed_words() {
    let i = interp_or_skip!();
    assert_eq!(i.array_to_list([1i64, -2, 30]), "1 -2 30");
    let owned = strings(&["x y", "z"]);
    assert_eq!(i.array_to_list(&owned), "{x y} z");
}

#[test]
fn list_to_array_fixtures() {
    let i = interp_or_skip!();
    assert_eq!(i.list_to_array(""), Some(vec![]));
    assert_eq!(i.list_to_array("{}"), Some(strings(&[""])));
    assert_eq!(i.list_to_array("one"), Some(strings(&["one"])));
    assert_eq!(i.list_to_array("one two"), Some(strings(&["one", "two"])));
    assert_eq!(i.list_to_array("a { b} c"), Some(strings(&["a", " b", "c"])));
    assert_eq!(i.list_to_array("a \\ b c"), Some(strings(&["a", " b", "c"])));
    assert_eq!(i.list_to_array("\\{"), Some(strings(&["{"])));
    assert_eq!(i.list_to_array("\\["), Some(strings(&["["])));
    assert_eq!(i.list_to_array("\\\""), Some(strings(&["\""])));
}

#[test]
fn malformed_list_is_none_not_error() {
    let i = interp_or_skip!();
    assert_eq!(i.list_to_array("{"), None);
    assert_eq!(i.list_to_array("a {b"), None);
    assert_eq!(i.list_to_array("{a}b"), None);
    // The session is unaffected.
    assert_eq!(i.eval("return ok").unwrap(), "ok");
}

#[test]
fn list_round_trip_with_metacharacters() {
    let i = interp_or_skip!();
    let words = strings(&["{", "}", "[x]", "$v", "a\\", "\"q\"", "semi;colon", "tab\there", "new\nline"]);
    let list = i.array_to_list(&words);
    assert_eq!(i.list_to_array(&list), Some(words.clone()));
    // Tcl's own parser agrees.
    assert_eq!(i.invoke(["llength", list.as_str()]).unwrap(), words.len().to_string());
}

// ── Host commands ─────────────────────────────────────────────────────────────

#[test]
fn exposed_command_receives_words_in_order() {
    let i = interp_or_skip!();
    let seen: Rc<RefCell<Vec<Vec<String>>>> = Rc::default();
    let log = Rc::clone(&seen);
    i.expose("pair", move |_, args| {
        log.borrow_mut().push(args.to_vec());
        Ok(format!("{}+{}", args[0], args[1]))
    })
    .unwrap();

    assert_eq!(i.eval("pair x1 x2").unwrap(), "x1+x2");
    assert_eq!(i.eval("pair {a b} \"c d\"").unwrap(), "a b+c d");
    assert_eq!(*seen.borrow(), vec![strings(&["x1", "x2"]), strings(&["a b", "c d"])]);
}

#[test]
fn raw_send_command_dispatches_by_name() {
    let i = interp_or_skip!();
    i.register("sum", |_, args| {
        let total: i64 = args.iter().filter_map(|a| a.parse::<i64>().ok()).sum();
        Ok(total.to_string())
    })
    .unwrap();
    assert_eq!(i.eval("interp_send sum 1 2 3").unwrap(), "6");
    // `register` alone creates no Tcl command.
    assert!(is_eval_error(i.eval("sum 1 2")));
    assert_eq!(i.host_commands(), strings(&["sum"]));
}

#[test]
fn result_is_usable_inside_script() {
    let i = interp_or_skip!();
    i.expose("twice", |_, args| Ok(format!("{0}{0}", args[0]))).unwrap();
    assert_eq!(i.eval("string length [twice abc]").unwrap(), "6");
}

#[test]
fn handler_failure_becomes_tcl_error() {
    let i = interp_or_skip!();
    i.expose("fail", |_, _| Err(CommandError::failed("boom"))).unwrap();
    let err = i.eval("fail").unwrap_err();
    assert_eq!(err.eval_message(), Some("boom"));
    assert_eq!(i.eval("catch {fail} msg; set msg").unwrap(), "boom");
    assert_eq!(i.state(), State::Ready);
}

#[test]
fn unknown_host_command() {
    let i = interp_or_skip!();
    let err = i.eval("interp_send nope").unwrap_err();
    assert_eq!(err.to_string(), "invalid command name \"nope\"");
    let err = i.eval("interp_send").unwrap_err();
    assert!(err.to_string().starts_with("wrong # args"));
}

#[test]
fn receiver_gets_unregistered_names() {
    let i = interp_or_skip!();
    i.set_receiver(|interp, args| Ok(interp.array_to_list(args)));
    assert_eq!(i.eval("interp_send anything {x y} z").unwrap(), "anything {x y} z");
    i.clear_receiver();
    assert!(is_eval_error(i.eval("interp_send anything")));
}

#[test]
fn handler_can_reenter_eval() {
    let i = interp_or_skip!();
    i.expose("inner", |_, args| Ok(format!("inner({})", args.join(",")))).unwrap();
    i.expose("outer", |interp, args| {
        let nested = interp.eval(&format!("inner {}", args[0]))?;
        Ok(format!("outer[{nested}]"))
    })
    .unwrap();
    assert_eq!(i.eval("outer 5").unwrap(), "outer[inner(5)]");
}

#[test]
fn recursive_dispatch() {
    let i = interp_or_skip!();
    i.expose("countdown", |interp, args| {
        let n: u32 = args[0].parse().map_err(|_| CommandError::failed("not a number"))?;
        if n == 0 {
            return Ok("done".into());
        }
        interp.eval(&format!("countdown {}", n - 1)).map_err(Into::into)
    })
    .unwrap();
    assert_eq!(i.eval("countdown 20").unwrap(), "done");
}

#[test]
fn nested_error_propagates_through_handler() {
    let i = interp_or_skip!();
    i.expose("run", |interp, args| Ok(interp.eval(&args[0])?)).unwrap();
    let err = i.eval("run {error deep}").unwrap_err();
    assert_eq!(err.eval_message(), Some("deep"));
}

#[test]
fn caught_exit_request_is_dropped() {
    let i = interp_or_skip!();
    i.expose("quit", |_, _| Err(CommandError::Exit(9))).unwrap();
    assert_eq!(i.eval("catch {quit}; return survived").unwrap(), "survived");
    assert_eq!(i.state(), State::Ready);
    // A later, unrelated error is an ordinary error.
    let err = i.eval("error later").unwrap_err();
    assert_eq!(err.eval_message(), Some("later"));
}

#[test]
fn handler_panic_is_reported_as_error() {
    let i = interp_or_skip!();
    i.expose("explode", |_, _| panic!("kaboom")).unwrap();
    let err = i.eval("explode").unwrap_err();
    assert_eq!(err.to_string(), "host command panicked: kaboom");
    assert_eq!(i.eval("return still-alive").unwrap(), "still-alive");
}

#[test]
fn unexpose_removes_command() {
    let i = interp_or_skip!();
    i.expose("temp", |_, _| Ok("here".into())).unwrap();
    assert_eq!(i.eval("temp").unwrap(), "here");
    assert!(i.unexpose("temp").unwrap());
    assert!(is_eval_error(i.eval("temp")));
    assert!(!i.unexpose("temp").unwrap());
}

#[test]
fn reexpose_replaces_handler() {
    let i = interp_or_skip!();
    i.expose("v", |_, _| Ok("one".into())).unwrap();
    i.expose("v", |_, _| Ok("two".into())).unwrap();
    assert_eq!(i.eval("v").unwrap(), "two");
}

#[test]
fn invalid_command_name() {
    let i = interp_or_skip!();
    assert!(matches!(i.expose("bad\0name", |_, _| Ok(String::new())), Err(Error::InvalidName(_))));
}

#[test]
fn invoke_quotes_each_word() {
    let i = interp_or_skip!();
    assert_eq!(i.invoke(["string", "length", "a b c"]).unwrap(), "5");
    assert_eq!(i.invoke(["set", "brace", "{"]).unwrap(), "{");
    assert_eq!(i.eval("set brace").unwrap(), "{");
}

// ── Procedures and variables ──────────────────────────────────────────────────

#[test]
fn procs_lists_new_procedures() {
    let i = interp_or_skip!();
    let before = i.procs().unwrap();
    i.eval("proc foo {} {}").unwrap();
    i.eval("proc bar {} {}").unwrap();
    let mut added: Vec<String> = i.procs().unwrap().into_iter().filter(|p| !before.contains(p)).collect();
    added.sort();
    assert_eq!(added, strings(&["bar", "foo"]));
}

#[test]
fn vars_lists_new_variables() {
    let i = interp_or_skip!();
    let before = i.vars().unwrap();
    i.eval("set a 0").unwrap();
    i.eval("set b(a) 0").unwrap();
    let mut added: Vec<String> = i.vars().unwrap().into_iter().filter(|v| !before.contains(v)).collect();
    added.sort();
    assert_eq!(added, strings(&["a", "b"]));
}

#[test]
fn proc_lookup() {
    let i = interp_or_skip!();
    assert!(is_eval_error(i.proc("foo").map(|p| p.name().to_owned())));
    i.eval("proc foo {} {}").unwrap();
    let p = i.proc("foo").unwrap();
    assert_eq!(p.name(), "foo");
    assert!(!p.is_builtin());
}

#[test]
fn proc_introspection_and_call() {
    let i = interp_or_skip!();
    let p = i
        .define_proc("greet", ["name", "greeting hello"], "return \"$greeting $name\"")
        .unwrap();
    assert_eq!(p.args().unwrap(), strings(&["name", "greeting"]));
    assert_eq!(p.body().unwrap(), "return \"$greeting $name\"");
    assert_eq!(p.default("name").unwrap(), None);
    assert_eq!(p.default("greeting").unwrap(), Some("hello".to_owned()));
    assert_eq!(p.call(["world"]).unwrap(), "hello world");
    assert_eq!(p.call(["there", "hi"]).unwrap(), "hi there");
}

#[test]
fn stub_proc_returns_body_result() {
    let i = interp_or_skip!();
    let p = i.define_proc("my_proc", [] as [&str; 0], "return hello").unwrap();
    assert_eq!(p.call([] as [&str; 0]).unwrap(), "hello");
}

#[test]
fn proc_to_tcl_recreates_procedure() {
    let i = interp_or_skip!();
    i.eval("proc greet {name {greeting hello}} {return \"$greeting $name\"}").unwrap();
    let script = i.proc("greet").unwrap().to_tcl().unwrap();
    assert!(script.starts_with("proc greet "));

    let fresh = interp_or_skip!();
    fresh.eval(&script).unwrap();
    assert_eq!(fresh.eval("greet you").unwrap(), "hello you");
    assert_eq!(fresh.eval("greet you hey").unwrap(), "hey you");
}

#[test]
fn init_procs_are_builtin() {
    let i = interp_or_skip!();
    for name in i.procs().unwrap() {
        assert!(i.proc(&name).unwrap().is_builtin(), "{name} should be built in");
    }
}

#[test]
fn var_lookup() {
    let i = interp_or_skip!();
    let err = i.var("foo").unwrap_err();
    assert!(err.to_string().contains("no such variable"), "{err}");
    i.eval("set foo bar").unwrap();
    let v = i.var("foo").unwrap();
    assert_eq!(v.name(), "foo");
    assert_eq!(v.kind(), VarKind::Scalar);
    assert_eq!(v.value().unwrap(), "bar");
    assert!(!v.is_builtin());
}

#[test]
fn var_with_spaces() {
    let i = interp_or_skip!();
    let v = i.set_var("foo", "bar baz").unwrap();
    assert_eq!(v.value().unwrap(), "bar baz");
    assert_eq!(v.to_tcl().unwrap(), "set foo {bar baz}");
}

#[test]
fn array_var() {
    let i = interp_or_skip!();
    i.eval("array set colors {red ff0000 blue 0000ff}").unwrap();
    let v = i.var("colors").unwrap();
    assert_eq!(v.kind(), VarKind::Array);
    assert_eq!(
        v.elements().unwrap(),
        vec![("blue".to_owned(), "0000ff".to_owned()), ("red".to_owned(), "ff0000".to_owned())]
    );
    assert_eq!(v.to_tcl().unwrap(), "array set colors {blue 0000ff red ff0000}");
}

#[test]
fn tcl_globals_are_builtin() {
    let i = interp_or_skip!();
    let _ = i.eval("error provoke");
    assert!(i.var("errorInfo").unwrap().is_builtin());
    assert!(i.var("tcl_version").unwrap().is_builtin());
}

#[test]
fn to_tcl_serialises_user_state() {
    let i = interp_or_skip!();
    i.eval("set i 10\nset j 20\nproc add {a b} {expr {$a + $b}}").unwrap();
    let _ = i.eval("error make-errorinfo");
    let script = i.to_tcl().unwrap();
    assert!(script.contains("set i 10\nset j 20"), "{script}");
    assert!(script.contains("proc add {a b}"), "{script}");
    assert!(!script.contains("errorInfo"), "{script}");

    let fresh = interp_or_skip!();
    fresh.eval(&script).unwrap();
    assert_eq!(fresh.eval("add $i $j").unwrap(), "30");
}

#[test]
fn to_tcl_skips_declared_but_unset_vars() {
    let i = interp_or_skip!();
    i.eval("namespace eval :: {variable declared}\nset kept 1").unwrap();
    let script = i.to_tcl().unwrap();
    assert!(script.contains("set kept 1"), "{script}");
    assert!(!script.contains("declared"), "{script}");
}

// ── Script files ──────────────────────────────────────────────────────────────

fn script_file(content: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(content.as_bytes()).unwrap();
    f
}

#[test]
fn load_from_file() {
    let i = interp_or_skip!();
    let vars = i.vars().unwrap();
    let procs = i.procs().unwrap();
    let f = script_file("set a 1\nset b 2\nproc c {} {}\nproc d {} {}\nproc e {} {}");
    let loaded = Interp::from_files([f.path()]).unwrap();

    let mut new_vars: Vec<String> = loaded.vars().unwrap().into_iter().filter(|v| !vars.contains(v)).collect();
    new_vars.sort();
    let mut new_procs: Vec<String> = loaded.procs().unwrap().into_iter().filter(|p| !procs.contains(p)).collect();
    new_procs.sort();
    assert_eq!(new_vars, strings(&["a", "b"]));
    assert_eq!(new_procs, strings(&["c", "d", "e"]));
}

#[test]
fn load_from_multiple_files() {
    let i = interp_or_skip!();
    let vars = i.vars().unwrap();
    let f1 = script_file("set a 1\nset b 2");
    // No trailing newline: files are joined with one.
    let f2 = script_file("set x 3\nset y 4");
    let loaded = Interp::from_files([f1.path(), f2.path()]).unwrap();
    let mut new_vars: Vec<String> = loaded.vars().unwrap().into_iter().filter(|v| !vars.contains(v)).collect();
    new_vars.sort();
    assert_eq!(new_vars, strings(&["a", "b", "x", "y"]));
}

#[test]
fn load_from_file_later() {
    let i = interp_or_skip!();
    let f = script_file("set x 3");
    i.load_from_file([f.path()]).unwrap();
    assert_eq!(i.eval("set x").unwrap(), "3");
}

#[test]
fn missing_file_is_io_error() {
    let i = interp_or_skip!();
    let err = i.load_from_file(["/nonexistent/script.tcl"]).unwrap_err();
    assert!(matches!(err, Error::Io { .. }), "{err}");
}

// ── Safe mode ─────────────────────────────────────────────────────────────────

#[test]
fn safe_interp_hides_unsafe_commands() {
    let i = match Interp::new_safe() {
        Ok(i) => i,
        Err(Error::Load(e)) => {
            eprintln!("skipping: {e}");
            return;
        }
        Err(e) => panic!("cannot create interpreter: {e}"),
    };
    assert!(i.is_safe());
    assert!(is_eval_error(i.eval("exit")));
    assert!(is_eval_error(i.eval(&format!("open {}", file!()))));
    assert_eq!(i.eval("expr {1 + 1}").unwrap(), "2");
}

#[test]
fn safe_interp_keeps_host_commands() {
    let i = interp_or_skip!();
    i.register("ping", |_, _| Ok("pong".into())).unwrap();
    i.make_safe().unwrap();
    assert!(i.is_safe());
    assert_eq!(i.eval("interp_send ping").unwrap(), "pong");
    assert!(is_eval_error(i.eval("exit")));
}

// ── Sessions ──────────────────────────────────────────────────────────────────

#[test]
fn sessions_are_independent() {
    let a = interp_or_skip!();
    let b = interp_or_skip!();
    a.eval("set who a").unwrap();
    b.eval("set who b").unwrap();
    a.expose("only_a", |_, _| Ok("a".into())).unwrap();
    assert_eq!(a.eval("set who").unwrap(), "a");
    assert_eq!(b.eval("set who").unwrap(), "b");
    assert!(is_eval_error(b.eval("only_a")));
}

#[test]
fn sessions_on_separate_threads() {
    if interp().is_none() {
        return;
    }
    let handles: Vec<_> = (0..4)
        .map(|n| {
            std::thread::spawn(move || {
                let i = Interp::new().unwrap();
                i.expose("id", move |_, _| Ok(n.to_string())).unwrap();
                i.eval(&format!("set n {n}")).unwrap();
                i.eval("expr {[id] * 10 + $n}").unwrap()
            })
        })
        .collect();
    let results: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results, strings(&["0", "11", "22", "33"]));
}

#[test]
fn many_short_lived_sessions() {
    if interp().is_none() {
        return;
    }
    for n in 0..50 {
        let i = Interp::new().unwrap();
        i.expose("n", move |_, _| Ok(n.to_string())).unwrap();
        assert_eq!(i.eval("n").unwrap(), n.to_string());
    }
}
