//! End-to-end translation scenarios: FSP source in, predicates over the
//! published LTSs out.

use indoc::indoc;

use fspx_compiler::{compile, Driver, Error, SemanticErrorKind};
use fspx_lts::NodeType;

fn build(source: &str) -> Driver {
    match compile(source, 100, false) {
        Ok(driver) => driver,
        Err(Error::Parse(diags)) => {
            panic!("parse failed:\n{}", diags.printer().source(source).render())
        }
        Err(Error::Semantic(e)) => panic!("semantic error: {e}"),
    }
}

fn semantic_error(source: &str) -> SemanticErrorKind {
    match compile(source, 100, false) {
        Ok(_) => panic!("expected a semantic error"),
        Err(Error::Semantic(e)) => e.kind,
        Err(Error::Parse(diags)) => {
            panic!("parse failed:\n{}", diags.printer().source(source).render())
        }
    }
}

#[test]
fn linear_process_with_deadlock() {
    let driver = build("P = (a -> b -> STOP).");
    let lts = driver.processes.get("P").expect("P published");

    assert_eq!(lts.num_states(), 3);
    let a = driver.actions.lookup("a").unwrap();
    let b = driver.actions.lookup("b").unwrap();
    assert_eq!(lts.step(0, a), Some(1));
    assert_eq!(lts.step(1, b), Some(2));
    assert_eq!(lts.node_type(2), NodeType::Normal);
    assert!(lts.edges(2).is_empty());
    assert_eq!(lts.alphabet().len(), 2);
    assert!(lts.in_alphabet(a) && lts.in_alphabet(b));

    let mut report = String::new();
    assert_eq!(lts.deadlock_analysis(&driver.actions, &mut report), 1);
    assert!(report.contains("Deadlock"));
    assert!(report.contains("a->b->"));
}

#[test]
fn end_state_terminates_successfully() {
    let driver = build("Q = (a -> END).");
    let lts = driver.processes.get("Q").expect("Q published");

    assert_eq!(lts.num_states(), 2);
    assert_eq!(lts.node_type(1), NodeType::End);
    let mut report = String::new();
    assert_eq!(lts.deadlock_analysis(&driver.actions, &mut report), 0);
}

#[test]
fn recursive_cycle_and_progress() {
    let mut driver = build(indoc! {"
        progress X = {a}
        progress Y = {c}
        R = (a -> b -> R).
    "});
    let a = driver.actions.lookup("a").unwrap();
    let b = driver.actions.lookup("b").unwrap();

    {
        let lts = driver.processes.get("R").expect("R published");
        assert_eq!(lts.num_states(), 2);
        assert_eq!(lts.step(0, a), Some(1));
        assert_eq!(lts.step(1, b), Some(0));
        assert!(lts.is_deterministic());
    }

    let x = driver.progresses.lookup("X").unwrap().clone();
    let y = driver.progresses.lookup("Y").unwrap().clone();
    let rc = driver.processes.get_mut("R").unwrap();
    let lts = std::rc::Rc::make_mut(rc);

    let sets = lts.terminal_sets().to_vec();
    assert_eq!(sets.len(), 1);
    let expected: std::collections::BTreeSet<u32> = [a, b].into();
    assert_eq!(sets[0].actions, expected);

    let mut report = String::new();
    assert_eq!(lts.progress("X", &x, &driver.actions, &mut report), 0);
    assert_eq!(lts.progress("Y", &y, &driver.actions, &mut report), 1);
    assert!(report.contains("Progress violation"));
    // The violating terminal set is entered within two steps.
    assert!(sets[0].trace.len() <= 2);
}

#[test]
fn synchronized_composition_stays_small() {
    let driver = build(indoc! {"
        P = (a -> b -> P).
        Q = (b -> a -> Q).
        ||S = (P || Q).
    "});
    let lts = driver.processes.get("S").expect("S published");
    assert!(lts.num_states() <= 2);
}

#[test]
fn parametric_defaults_and_arguments() {
    let mut driver = build(indoc! {"
        const N = 2
        range T = 0..N
        A(I=0) = (a[I] -> A).
    "});

    let lts = driver.processes.get("A(0)").expect("A(0) published");
    assert_eq!(lts.num_states(), 1);
    let a0 = driver.actions.lookup("a[0]").unwrap();
    assert_eq!(lts.step(0, a0), Some(0));

    let lts = driver
        .get_lts("A(2)", true)
        .expect("translation succeeds")
        .expect("A(2) known");
    assert_eq!(lts.num_states(), 1);
    let a2 = driver.actions.lookup("a[2]").unwrap();
    assert_eq!(lts.step(0, a2), Some(0));
}

#[test]
fn property_completion_adds_error_edges() {
    let driver = build("property PL = (a -> b -> PL).");
    let lts = driver.processes.get("PL").expect("PL published");
    let a = driver.actions.lookup("a").unwrap();
    let b = driver.actions.lookup("b").unwrap();

    assert_eq!(lts.num_states(), 3);
    let err = (0..lts.num_states() as u32)
        .find(|&i| lts.node_type(i) == NodeType::Error)
        .expect("error state exists");
    assert_eq!(lts.step(0, a), Some(1));
    assert_eq!(lts.step(0, b), Some(err));
    assert_eq!(lts.step(1, b), Some(0));
    assert_eq!(lts.step(1, a), Some(err));

    let mut report = String::new();
    assert_eq!(lts.deadlock_analysis(&driver.actions, &mut report), 1);
    assert!(report.contains("Property violation"));
}

#[test]
fn local_definitions_over_index_ranges() {
    let driver = build(indoc! {"
        const N = 2
        Count = Count[0],
        Count[i:0..N] = (when i<N inc -> Count[i+1]
                        | when i>0 dec -> Count[i-1]).
    "});
    let lts = driver.processes.get("Count").expect("Count published");
    assert_eq!(lts.num_states(), 3);

    let inc = driver.actions.lookup("inc").unwrap();
    let dec = driver.actions.lookup("dec").unwrap();
    // 0 --inc--> 1 --inc--> 2, and back down with dec.
    let s1 = lts.step(0, inc).expect("inc from 0");
    let s2 = lts.step(s1, inc).expect("inc from 1");
    assert_eq!(lts.step(s2, inc), None);
    assert_eq!(lts.step(s2, dec), Some(s1));
    assert_eq!(lts.step(s1, dec), Some(0));
}

#[test]
fn choice_over_label_sets() {
    let driver = build("P = ({a, b}.x -> STOP).");
    let lts = driver.processes.get("P").expect("P published");
    let ax = driver.actions.lookup("a.x").unwrap();
    let bx = driver.actions.lookup("b.x").unwrap();
    assert!(lts.step(0, ax).is_some());
    assert!(lts.step(0, bx).is_some());
}

#[test]
fn variable_binding_in_chain_feeds_later_elements() {
    let driver = build("P = (a[i:0..1].b[i] -> STOP).");
    let lts = driver.processes.get("P").expect("P published");
    // Each value of i expands independently: a[0].b[0] and a[1].b[1].
    assert!(driver.actions.lookup("a[0].b[0]").is_some());
    assert!(driver.actions.lookup("a[1].b[1]").is_some());
    assert_eq!(driver.actions.lookup("a[0].b[1]"), None);
    assert_eq!(lts.edges(0).len(), 2);
}

#[test]
fn relabeling_and_hiding_pipeline() {
    let driver = build(indoc! {"
        P = (run -> halt -> P) /{go/run} \\ {halt}.
    "});
    let lts = driver.processes.get("P").expect("P published");
    let go = driver.actions.lookup("go").unwrap();
    assert!(lts.in_alphabet(go));
    // halt was hidden: only `go` remains observable.
    assert_eq!(lts.alphabet().len(), 1);
}

#[test]
fn alphabet_extension_is_published() {
    let driver = build("P = (a -> P) + {b, c}.");
    let lts = driver.processes.get("P").expect("P published");
    assert_eq!(lts.alphabet().len(), 3);
}

#[test]
fn sequential_composition_splices_at_end() {
    let driver = build(indoc! {"
        MAKE = (make -> END).
        JOB = MAKE;MAKE;END.
    "});
    let lts = driver.processes.get("JOB").expect("JOB published");
    let make = driver.actions.lookup("make").unwrap();
    let s1 = lts.step(0, make).expect("first make");
    let s2 = lts.step(s1, make).expect("second make");
    assert_eq!(lts.node_type(s2), NodeType::End);
    let mut report = String::new();
    assert_eq!(lts.deadlock_analysis(&driver.actions, &mut report), 0);
}

#[test]
fn composite_labeling_multiplies_copies() {
    let driver = build(indoc! {"
        P = (a -> P).
        ||S = {x, y}:P.
    "});
    let lts = driver.processes.get("S").expect("S published");
    assert!(driver.actions.lookup("x.a").is_some());
    assert!(driver.actions.lookup("y.a").is_some());
    // Two interleaved relabeled copies over disjoint alphabets.
    assert_eq!(lts.num_states(), 1);
    assert_eq!(lts.num_transitions(), 2);
}

#[test]
fn duplicate_constant_is_rejected() {
    let kind = semantic_error("const N = 1\nconst N = 2\nP = (a -> P).");
    assert!(matches!(
        kind,
        SemanticErrorKind::Duplicate { what: "const", .. }
    ));
}

#[test]
fn undeclared_reference_is_rejected() {
    let kind = semantic_error("||S = MISSING.");
    assert!(matches!(kind, SemanticErrorKind::Undeclared { .. }));
}

#[test]
fn unresolved_local_name_is_rejected() {
    let kind = semantic_error("P = (a -> MISSING).");
    assert!(matches!(kind, SemanticErrorKind::UnresolvedReference { .. }));
}

#[test]
fn nondeterministic_property_is_rejected() {
    let kind = semantic_error(indoc! {"
        property P = (a -> STOP | a -> b -> STOP).
    "});
    assert!(matches!(
        kind,
        SemanticErrorKind::NondeterministicProperty { .. }
    ));
}

#[test]
fn runaway_recursion_is_bounded() {
    let source = indoc! {"
        P = Q;END.
        Q = P;END.
    "};
    match compile(source, 10, false) {
        Err(Error::Semantic(e)) => {
            assert!(matches!(e.kind, SemanticErrorKind::DepthExceeded { .. }))
        }
        other => panic!("expected depth error, got {:?}", other.is_ok()),
    }
}

#[test]
fn extended_name_arity_must_match() {
    let mut driver = build("A(I=0) = (a[I] -> A).");
    assert!(driver.get_lts("A(1,2)", true).unwrap().is_none());
    assert!(driver.get_lts("A (1)", true).unwrap().is_none());
    assert!(driver.get_lts("A(1)", true).unwrap().is_some());
}
