mod fixtures;

use fixtures::{Event, Mock, school_db};
use relmodel::prelude::*;
use std::collections::BTreeMap;

fn row(pairs: &[(&str, Value)]) -> Row {
    Row::from_pairs(pairs.iter().cloned())
}

fn values(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
    pairs.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect()
}

#[test]
fn select_is_bound_before_it_reaches_the_driver() {
    let mock = Mock::new(Dialect::SqlServer);
    mock.rows(vec![row(&[("email", Value::from("ana@example.com"))])]);
    let db = school_db(&mock, Config::default());

    let select = db
        .sql("person")
        .unwrap()
        .fields("$email")
        .where_("$id = @0")
        .parameter(42);
    let mut exec = db.executor();
    let rows = exec.rows(&select).unwrap();

    assert_eq!(rows.len(), 1);
    let commands = mock.commands();
    assert_eq!(commands.len(), 1);
    assert_eq!(
        commands[0].text,
        "SELECT pers.email\nFROM person AS pers\nWHERE pers.id = @_0\nORDER BY 1\n"
    );
    assert_eq!(commands[0].parameters, vec![("_0".to_string(), Value::Int(42))]);
}

#[test]
fn sequence_parameters_expand_in_place() {
    let mock = Mock::new(Dialect::SqlServer);
    let db = school_db(&mock, Config::default());

    let select = db
        .sql("person")
        .unwrap()
        .fields("$email")
        .where_("$id IN (@0)")
        .parameter(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    db.executor().rows(&select).unwrap();

    let cmd = &mock.commands()[0];
    assert!(cmd.text.contains("pers.id IN (@_0_0, @_0_1, @_0_2)"));
    assert_eq!(cmd.param("_0_2"), Some(&Value::Int(3)));
}

#[test]
fn missing_parameter_never_reaches_the_driver() {
    let mock = Mock::new(Dialect::SqlServer);
    let db = school_db(&mock, Config::default());

    let select = db.sql("person").unwrap().where_("$id = @0");
    let err = db.executor().rows(&select).unwrap_err();

    assert!(matches!(err, Error::MissingParameter(ref p) if p == "@0"));
    assert!(mock.events().is_empty());
}

#[test]
fn transport_errors_name_the_entity() {
    let mock = Mock::new(Dialect::MySql);
    mock.query_error("connection reset");
    let db = school_db(&mock, Config::default().with_dialect(Dialect::MySql));

    let err = db.executor().rows(&db.sql("city").unwrap()).unwrap_err();
    assert!(err.is_transport());
    assert!(err.to_string().contains("city"));
}

#[test]
fn scalars_objects_and_columns() {
    #[derive(Debug, serde::Deserialize, PartialEq)]
    struct City {
        id: i32,
        name: String,
    }

    let mock = Mock::new(Dialect::SqlServer);
    let cities = vec![
        row(&[("id", Value::Int(1)), ("name", Value::from("Lima"))]),
        row(&[("id", Value::Int(2)), ("name", Value::from("Cusco"))]),
    ];
    mock.rows(vec![row(&[("count", Value::Long(2))])])
        .rows(cities.clone())
        .rows(cities.clone())
        .rows(Vec::new());
    let db = school_db(&mock, Config::default());
    let mut exec = db.executor();

    let count: Option<i64> = exec.value(&db.sql("city").unwrap().count()).unwrap();
    assert_eq!(count, Some(2));

    let objects: Vec<City> = exec.objects(&db.sql("city").unwrap()).unwrap();
    assert_eq!(objects[1], City { id: 2, name: "Cusco".into() });

    let names: Vec<String> = exec.column_at(&db.sql("city").unwrap(), 1).unwrap();
    assert_eq!(names, vec!["Lima", "Cusco"]);

    let none: Option<City> = exec.object(&db.sql("city").unwrap()).unwrap();
    assert!(none.is_none());
    assert_eq!(mock.opened(), 1);
}

#[test]
fn cached_rows_are_served_once() {
    let mock = Mock::new(Dialect::SqlServer);
    mock.rows(vec![row(&[("id", Value::Int(3)), ("name", Value::from("Lima"))])]);
    let db = school_db(&mock, Config::default());

    let select = db.sql("city").unwrap().where_("$id = @0").parameter(3);
    let first = db.executor().rows_cached(&select).unwrap();
    let second = db.executor().rows_cached(&select).unwrap();

    assert_eq!(first, second);
    assert_eq!(mock.commands().len(), 1);
    assert_eq!(db.cache().len(), 1);

    db.cache().invalidate_all();
    db.executor().rows_cached(&select).unwrap();
    assert_eq!(mock.commands().len(), 2);
}

#[test]
fn transaction_commits_the_whole_batch() {
    let mock = Mock::new(Dialect::SqlServer);
    mock.affected(2);
    let db = school_db(&mock, Config::default());

    let batch = db
        .persist()
        .insert("city", &values(&[("id", Value::Int(1)), ("name", Value::from("Lima"))]))
        .unwrap()
        .update("city", &values(&[("name", Value::from("Cusco"))]))
        .unwrap()
        .where_("$id = @0", vec![Value::Int(2)])
        .unwrap();

    let mut exec = db.executor();
    assert_eq!(exec.transaction(&batch).unwrap(), 2);
    assert!(!exec.in_transaction());

    let events = mock.events();
    assert_eq!(events.len(), 3);
    assert_eq!(events[0], Event::Begin);
    assert_eq!(events[2], Event::Commit);
    let Event::Execute(cmd) = &events[1] else {
        panic!("expected an execute, got {:?}", events[1]);
    };
    assert!(cmd.text.starts_with("INSERT INTO city (id, name)\nVALUES (@_0, @_1);"));
    assert_eq!(cmd.param("_2"), Some(&Value::from("Cusco")));
    assert_eq!(cmd.param("_3"), Some(&Value::Int(2)));
}

#[test]
fn split_transaction_rolls_back_on_failure() {
    let mock = Mock::new(Dialect::SqlServer);
    mock.affected(1).execute_error("duplicate key");
    let db = school_db(&mock, Config::default());

    let batch = db
        .persist()
        .insert("city", &values(&[("id", Value::Int(1)), ("name", Value::from("Lima"))]))
        .unwrap()
        .insert("city", &values(&[("id", Value::Int(1)), ("name", Value::from("Cusco"))]))
        .unwrap();

    let mut exec = db.executor();
    let err = exec.transaction_split(&batch).unwrap_err();

    match err {
        Error::Transaction { statement, source } => {
            assert_eq!(statement, 1);
            assert!(source.is_transport());
        }
        other => panic!("unexpected error: {other:?}"),
    }
    let events = mock.events();
    assert_eq!(events.last(), Some(&Event::Rollback));
    assert!(!events.contains(&Event::Commit));
    assert!(!exec.in_transaction());
}

#[test]
fn failed_commit_rolls_back_and_reports_the_batch() {
    let mock = Mock::new(Dialect::SqlServer);
    mock.commit_error("log full");
    let db = school_db(&mock, Config::default());

    let batch = db
        .persist()
        .insert("city", &values(&[("id", Value::Int(1)), ("name", Value::from("Lima"))]))
        .unwrap()
        .insert("city", &values(&[("id", Value::Int(2)), ("name", Value::from("Cusco"))]))
        .unwrap();

    let mut exec = db.executor();
    let err = exec.transaction_split(&batch).unwrap_err();

    match err {
        Error::Transaction { statement, source } => {
            assert_eq!(statement, 1);
            assert!(source.is_transport());
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!exec.in_transaction());
    let events = mock.events();
    assert_eq!(events.last(), Some(&Event::Rollback));
    assert!(!events.contains(&Event::Commit));
}

#[test]
fn dropping_an_open_transaction_rolls_it_back() {
    let mock = Mock::new(Dialect::SqlServer);
    let db = school_db(&mock, Config::default());
    {
        let mut exec = db.executor();
        exec.begin().unwrap();
        assert!(exec.begin().unwrap_err().is_usage());
    }
    assert_eq!(mock.events(), vec![Event::Begin, Event::Rollback]);
}

#[test]
fn next_and_max_defaults_query_the_database() {
    let mock = Mock::new(Dialect::SqlServer);
    mock.rows(vec![row(&[("next", Value::Long(8))])]).rows(Vec::new());
    let db = school_db(&mock, Config::default());

    let student = db.values("student").unwrap();
    assert_eq!(student.default_value("id").unwrap(), Value::Int(8));
    let cmd = &mock.commands()[0];
    assert!(cmd.text.contains("IDENT_CURRENT(@_0)"));
    assert_eq!(cmd.param("_0"), Some(&Value::from("student")));

    let person = db.values("person").unwrap();
    assert_eq!(person.default_value("code").unwrap(), Value::Int(1));
}

#[test]
fn relations_follow_their_parents() {
    let mock = Mock::new(Dialect::SqlServer);
    mock.rows(vec![row(&[
        ("id", Value::Int(5)),
        ("email", Value::from("ana@example.com")),
        ("city", Value::Int(3)),
    ])])
    .rows(vec![row(&[("id", Value::Int(3)), ("name", Value::from("Lima"))])]);
    let db = school_db(&mock, Config::default());

    let mut student = db.values("student").unwrap();
    student.set("id", 1).unwrap().set("person", 5).unwrap();

    let city = student.values_rel("person__city").unwrap().unwrap();
    assert_eq!(city.entity_name(), "city");
    assert_eq!(city.get("name").unwrap(), &Value::from("Lima"));

    let params: Vec<_> = mock.commands().iter().map(|c| c.param("_0").cloned()).collect();
    assert_eq!(params, vec![Some(Value::Int(5)), Some(Value::Int(3))]);

    // no tutor, no lookup
    assert!(student.values_tree("tutor").unwrap().is_none());
    assert_eq!(mock.commands().len(), 2);
}

#[test]
fn entity_values_round_trip_through_persist() {
    let mock = Mock::new(Dialect::SqlServer);
    let db = school_db(&mock, Config::default());

    let mut person = db.values("person").unwrap();
    person
        .sset("id", "7")
        .unwrap()
        .sset("email", "  ana@example.com ")
        .unwrap()
        .sset("name", "  Ana   Maria")
        .unwrap()
        .reset()
        .unwrap();
    assert!(person.check());
    assert_eq!(person.label(), "ana@example.com");

    let batch = db.persist().insert("person", person.values()).unwrap();
    db.executor().transaction(&batch).unwrap();

    let cmd = &mock.commands()[0];
    assert!(cmd.parameters.iter().any(|(_, v)| v == &Value::from("Ana Maria")));
    assert!(cmd.parameters.iter().any(|(_, v)| v == &Value::Int(7)));
}

#[test]
fn hooks_registered_on_the_container_reach_value_stores() {
    let mock = Mock::new(Dialect::SqlServer);
    let hooks = FieldHooks::new().on_reset("person", "email", |v| {
        let lower = v.get_or_null("email").to_string().to_lowercase();
        let _ = v.set("email", lower);
    });
    let db = school_db(&mock, Config::default()).with_hooks(hooks);

    let mut person = db.values("person").unwrap();
    person.set("email", "ANA@EXAMPLE.COM").unwrap();
    person.reset_field("email").unwrap();
    assert_eq!(person.get("email").unwrap(), &Value::from("ana@example.com"));
}
