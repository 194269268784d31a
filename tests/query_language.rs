use larder::query::{cast, check_conditions, format, params, statement};
use serde_json::{json, Map, Value};

fn doc() -> Map<String, Value> {
    let Value::Object(map) = json!({
        "type": "book",
        "id": 3,
        "title": "Alpha Centauri",
        "pages": 5,
        "weight": 5.0,
        "tags": ["scifi", "classic"],
        "numbers": [1, 2, 3],
    }) else {
        unreachable!()
    };
    map
}

#[test]
fn cast_scalars() {
    assert_eq!(cast("5"), json!(5));
    assert_eq!(cast("-5"), json!(-5));
    assert_eq!(cast("3.14"), json!(3.14));
    assert_eq!(cast("true"), json!(true));
    assert_eq!(cast("FALSE"), json!(false));
    assert_eq!(cast("\"hello\""), json!("hello"));
    assert_eq!(cast("'hello'"), json!("hello"));
    // an unquoted non-numeric token is not a value
    assert_eq!(cast("hello"), Value::Null);
    assert_eq!(cast(""), Value::Null);
}

#[test]
fn cast_lists() {
    assert_eq!(cast("1,2,3"), json!([1, 2, 3]));
    assert_eq!(cast("\"a\",\"b\""), json!(["a", "b"]));
    assert_eq!(cast(" 1 , true , \"x\" "), json!([1, true, "x"]));
}

#[test]
fn format_round_trips_through_cast() {
    for value in [json!(5), json!(-2.5), json!(true), json!("hello"), json!([1, 2, 3])] {
        assert_eq!(cast(&format(&value)), value, "round trip of {value}");
    }
}

#[test]
fn params_splits_on_last_divider() {
    assert_eq!(params("book::id==3"), Some(("book", "id==3")));
    // the divider inside the condition belongs to the condition side
    assert_eq!(params("note::text==\"a::b\""), Some(("note::text==\"a", "b\"")));
    assert_eq!(params("book_3"), None);
}

#[test]
fn statement_fills_placeholders() {
    let query = statement("book", "id=={};title==.{}", &[json!(3), json!("alpha")]);
    assert_eq!(query, "book::id==3;title==.\"alpha\"");
    // surplus placeholders stay empty, the template tail survives
    let query = statement("book", "id=={} ", &[]);
    assert_eq!(query, "book::id== ");
}

#[test]
fn equality_and_negation() {
    let doc = doc();
    assert!(check_conditions(&doc, "id==3").expect("check ok"));
    assert!(!check_conditions(&doc, "id==4").expect("check ok"));
    assert!(check_conditions(&doc, "id!=4").expect("check ok"));
    assert!(check_conditions(&doc, "title==\"Alpha Centauri\"").expect("check ok"));
    assert!(!check_conditions(&doc, "title==\"alpha centauri\"").expect("check ok"));
    assert!(check_conditions(&doc, "title==.\"alpha centauri\"").expect("check ok"));
    assert!(check_conditions(&doc, "title!=.\"beta\"").expect("check ok"));
}

#[test]
fn loose_versus_strict_equality() {
    let doc = doc();
    // == coerces numerics, => does not
    assert!(check_conditions(&doc, "pages==5.0").expect("check ok"));
    assert!(check_conditions(&doc, "pages==weight").expect("check ok"));
    assert!(!check_conditions(&doc, "pages=>5.0").expect("check ok"));
    assert!(check_conditions(&doc, "pages=>5").expect("check ok"));
}

#[test]
fn membership_and_substrings() {
    let doc = doc();
    assert!(check_conditions(&doc, "2->numbers").expect("check ok"));
    assert!(check_conditions(&doc, "5!->numbers").expect("check ok"));
    assert!(check_conditions(&doc, "\"scifi\"->tags").expect("check ok"));
    assert!(check_conditions(&doc, "\"SCIFI\"->.tags").expect("check ok"));
    // a string haystack tests for substring
    assert!(check_conditions(&doc, "\"Cent\"->title").expect("check ok"));
    assert!(check_conditions(&doc, "title<%\"Alpha\"").expect("check ok"));
    assert!(check_conditions(&doc, "title%>.\"CENTAURI\"").expect("check ok"));
    assert!(check_conditions(&doc, "title!<%\"Beta\"").expect("check ok"));
}

#[test]
fn ordering() {
    let doc = doc();
    assert!(check_conditions(&doc, "id>2").expect("check ok"));
    assert!(check_conditions(&doc, "id>=3").expect("check ok"));
    assert!(check_conditions(&doc, "id<=3").expect("check ok"));
    assert!(!check_conditions(&doc, "id<3").expect("check ok"));
    assert!(check_conditions(&doc, "title>\"Alpha\"").expect("check ok"));
    // incomparable operands are unordered, never an error
    assert!(!check_conditions(&doc, "title>5").expect("check ok"));
    assert!(!check_conditions(&doc, "numbers>1").expect("check ok"));
}

#[test]
fn chained_operators_conjoin() {
    let doc = doc();
    assert!(check_conditions(&doc, "2<id<=3").expect("check ok"));
    assert!(!check_conditions(&doc, "2<id<3").expect("check ok"));
}

#[test]
fn clauses_conjoin() {
    let doc = doc();
    assert!(check_conditions(&doc, "id==3;pages>4").expect("check ok"));
    assert!(!check_conditions(&doc, "id==3;pages>5").expect("check ok"));
    // empty clauses are vacuously true
    assert!(check_conditions(&doc, "id==3;;").expect("check ok"));
    assert!(check_conditions(&doc, "").expect("check ok"));
}

#[test]
fn missing_fields_are_null() {
    let doc = doc();
    // an unknown field and an unquoted token are both null
    assert!(check_conditions(&doc, "missing==nothing").expect("check ok"));
    assert!(!check_conditions(&doc, "missing==3").expect("check ok"));
}

#[test]
fn operator_free_clause_is_vacuously_true() {
    let doc = doc();
    // a lone operand asserts no facts, whether or not it names a field
    assert!(check_conditions(&doc, "title").expect("valid clause"));
    assert!(check_conditions(&doc, "nonsense").expect("valid clause"));
    assert!(check_conditions(&doc, "id==3;title").expect("valid clause"));
    // the remaining clauses still decide the outcome
    assert!(!check_conditions(&doc, "id==4;title").expect("valid clause"));
}
