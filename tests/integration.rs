use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use rulebook::{
    ActionTable,
    Context,
    Engine,
    EvalError,
    KeyValueCoding,
    Model,
    Qualifier,
    Result,
    Rule,
    RuleError,
    Value,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Two greeting rules: French at priority 10, a catch-all at priority 0.
fn greeting_engine() -> Result<Engine> {
    Ok(Engine::new([
        Rule::new("lang = 'fr'", "greeting", "Bonjour", 10)?,
        Rule::new("true = true", "greeting", "Hello", 0)?,
    ]))
}

#[derive(Debug)]
struct Release {
    title: String,
    number: i64,
}

impl KeyValueCoding for Release {
    fn type_name(&self) -> &str {
        "Release"
    }

    fn value_for_key(&self, key: &str) -> Result<Option<Value>, EvalError> {
        Ok(match key {
            "title" => Some(Value::from(self.title.as_str())),
            "number" => Some(Value::Int(self.number)),
            _ => None,
        })
    }
}

fn releases() -> Vec<Release> {
    [("abcde", 1), ("bcdea", 2), ("cdeab", 3), ("ABCDE", 4)]
        .into_iter()
        .map(|(title, number)| Release {
            title: title.to_string(),
            number,
        })
        .collect()
}

fn numbers(found: &[&Release]) -> Vec<i64> {
    found.iter().map(|r| r.number).collect()
}

#[test]
fn test_greeting_by_language() -> Result<()> {
    init_logging();
    let engine = greeting_engine()?;

    let fr = Context::new(&engine, [("lang", "fr")]);
    assert_eq!(engine.lookup("greeting", &fr)?, Some(Value::from("Bonjour")));

    let en = Context::new(&engine, [("lang", "en")]);
    assert_eq!(engine.lookup("greeting", &en)?, Some(Value::from("Hello")));
    assert_eq!(en.get("greeting")?, Some(Value::from("Hello")));
    Ok(())
}

#[test]
fn test_default_for_an_attribute_the_rules_read() -> Result<()> {
    init_logging();
    let engine = Engine::new([
        Rule::new("region = 'quebec'", "lang", "fr", 5)?,
        Rule::new("true = true", "lang", "en", 0)?,
    ]);

    let ctx = engine.context();
    assert_eq!(ctx.get("lang")?, Some(Value::from("en")));

    let quebec = Context::new(&engine, [("region", "quebec")]);
    assert_eq!(quebec.get("lang")?, Some(Value::from("fr")));
    Ok(())
}

#[test]
fn test_switching_language_recomputes() -> Result<()> {
    init_logging();
    let engine = greeting_engine()?;
    let mut ctx = Context::new(&engine, [("lang", "en")]);

    assert_eq!(ctx.get("greeting")?, Some(Value::from("Hello")));
    ctx.set("lang", "fr");
    assert_eq!(ctx.get("greeting")?, Some(Value::from("Bonjour")));
    Ok(())
}

#[test]
fn test_unrelated_fact_invalidates_lookups() -> Result<()> {
    init_logging();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let engine = Engine::new([Rule::new("lang = 'fr'", "x", Value::Null, 1)?.with_action(
        move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Value::from("computed"))
        },
    )]);
    let mut ctx = Context::new(&engine, [("lang", "fr")]);

    ctx.get("x")?;
    ctx.get("x")?;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    ctx.set("y", 1);
    assert_eq!(ctx.get("x")?, Some(Value::from("computed")));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    Ok(())
}

#[test]
fn test_actions_look_up_other_attributes() -> Result<()> {
    init_logging();
    let engine = Engine::new([
        Rule::new("lang = 'fr'", "greeting", "Bonjour", 1)?,
        Rule::new("name = name", "welcome", Value::Null, 1)?.with_action(|_, ctx| {
            let greeting = ctx.get("greeting")?.unwrap_or_default();
            let name = ctx.get("name")?.unwrap_or_default();
            Ok(Value::from(format!("{greeting} {name}")))
        }),
    ]);
    let ctx = Context::new(&engine, [("lang", "fr"), ("name", "Ada")]);
    assert_eq!(ctx.get("welcome")?, Some(Value::from("Bonjour Ada")));
    Ok(())
}

#[test]
fn test_conditions_read_derived_attributes() -> Result<()> {
    init_logging();
    let engine = Engine::new([
        Rule::new("age >= 18", "adult", true, 1)?,
        Rule::new("age < 18", "adult", false, 1)?,
        Rule::new("adult = true", "drink", "wine", 1)?,
        Rule::new("adult = false", "drink", "juice", 1)?,
    ]);

    let grown = Context::new(&engine, [("age", 30)]);
    assert_eq!(grown.get("drink")?, Some(Value::from("wine")));

    let child = Context::new(&engine, [("age", 9)]);
    assert_eq!(child.get("drink")?, Some(Value::from("juice")));
    Ok(())
}

#[test]
fn test_mutual_recursion_is_detected() -> Result<()> {
    init_logging();
    let engine = Engine::new([
        Rule::new("b = 1", "a", 1, 1)?,
        Rule::new("a = 1", "b", 1, 1)?,
    ]);
    let ctx = engine.context();
    match ctx.get("a") {
        Err(RuleError::Cycle { chain }) => assert_eq!(chain, ["a", "b", "a"]),
        other => panic!("expected a cycle, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_depth_limit_without_cycle_detection() -> Result<()> {
    init_logging();
    let engine = Engine::builder()
        .detect_cycles(false)
        .max_lookup_depth(8)
        .rules([Rule::new("a = 1", "a", 1, 1)?])
        .build();
    let ctx = engine.context();
    assert!(matches!(
        ctx.get("a"),
        Err(RuleError::DepthExceeded { limit: 8, .. })
    ));
    Ok(())
}

#[test]
fn test_models_load_in_order() -> Result<()> {
    init_logging();
    let base = Model::from_json(
        r#"[
            {"lhs": "lang = 'fr'", "key": "greeting", "val": "Bonjour", "pri": 10},
            {"lhs": "true = true", "key": "greeting", "val": "Hello"}
        ]"#,
    )?;
    let extra = Model::from_json(
        r#"[{"lhs": "lang = %@", "bindings": ["de"], "key": "greeting",
             "ass": "german", "pri": 10}]"#,
    )?;
    let mut actions = ActionTable::new();
    actions.register("german", |_, _| Ok(Value::from("Guten Tag")));

    let engine = Engine::from_models([base, extra], &actions)?;
    assert_eq!(engine.rules_for("greeting").count(), 3);

    let de = Context::new(&engine, [("lang", "de")]);
    assert_eq!(de.get("greeting")?, Some(Value::from("Guten Tag")));
    let fr = Context::new(&engine, [("lang", "fr")]);
    assert_eq!(fr.get("greeting")?, Some(Value::from("Bonjour")));
    let it = Context::new(&engine, [("lang", "it")]);
    assert_eq!(it.get("greeting")?, Some(Value::from("Hello")));
    Ok(())
}

#[test]
fn test_filter_custom_objects() -> Result<()> {
    init_logging();
    let items = releases();

    let q = Qualifier::parse("title like 'a*'")?;
    assert_eq!(numbers(&Qualifier::filter(&items, &q)?), [1]);

    let q = Qualifier::parse("title cilike 'a*'")?;
    assert_eq!(numbers(&Qualifier::filter(&items, &q)?), [1, 4]);

    let q = Qualifier::parse_with("(number >= %d) AND (NOT (title = %@))", &[
        2.into(),
        "cdeab".into(),
    ])?;
    assert_eq!(numbers(&Qualifier::filter(&items, &q)?), [2, 4]);

    let q = Qualifier::match_any([("number", 1), ("number", 3)]);
    assert_eq!(numbers(&Qualifier::filter(&items, &q)?), [1, 3]);
    Ok(())
}

#[test]
fn test_conditions_evaluate_against_the_context() -> Result<()> {
    init_logging();
    let engine = greeting_engine()?;
    let ctx = Context::new(&engine, [("lang", "fr")]);

    let q = Qualifier::parse("(greeting = 'Bonjour') AND (lang = 'fr')")?;
    assert!(q.evaluate(&ctx)?);
    assert!(ctx.evaluate(&q)?);

    let missing = Qualifier::parse("nickname = nil")?;
    assert!(ctx.evaluate(&missing)?);
    Ok(())
}

#[test]
fn test_stop_at_first_matching_priority() -> Result<()> {
    init_logging();
    let engine = Engine::new([
        Rule::new("lang = 'de'", "greeting", "Hallo", 10)?,
        Rule::new("lang = 'fr'", "greeting", "Salut", 5)?,
        Rule::new("true = true", "greeting", "Hello", 5)?,
        Rule::new("lang = 'fr'", "greeting", "Bonsoir", 1)?,
    ]);
    let ctx = Context::new(&engine, [("lang", "fr")]);

    let found: Vec<_> = engine
        .candidates("greeting", &ctx)?
        .into_iter()
        .map(|rule| rule.value().to_string())
        .collect();
    assert_eq!(found, ["Salut", "Hello"]);
    assert_eq!(engine.lookup("greeting", &ctx)?, Some(Value::from("Salut")));
    Ok(())
}
