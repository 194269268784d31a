use larder::record::{Id, Record, Tag};
use larder::settings::Settings;
use larder::store::Store;
use larder::LarderError;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Book {
    id: Id,
    title: String,
    pages: i64,
}

impl Record for Book {
    const KIND: &'static str = "book";
    fn id(&self) -> &Id {
        &self.id
    }
}

fn book(id: impl Into<Id>, title: &str, pages: i64) -> Book {
    Book { id: id.into(), title: title.to_owned(), pages }
}

fn setup() -> Store {
    let mut store = Store::in_memory(&Settings::default()).expect("store");
    assert!(store.register::<Book>());
    store
}

#[test]
fn registration_is_first_write_wins() {
    let mut store = setup();
    assert!(!store.register::<Book>(), "duplicate discriminator must be a no-op");
    assert!(!store.register::<Tag>(), "tag is registered out of the box");
}

#[test]
fn set_under_unique_key_and_get_back() {
    let store = setup();
    let key = store.set(None, &book(1, "Dune", 412)).expect("set");
    assert_eq!(key, "book_1");
    let fetched = store.get("book_1").expect("get");
    let entry = fetched.as_entry().expect("a typed record, not a payload");
    assert_eq!(entry.kind(), "book");
    assert_eq!(entry.id(), &Id::Number(1));
    let decoded: Book = entry.decode().expect("decode");
    assert_eq!(decoded.title, "Dune");
    assert_eq!(entry.unique(), "book_1");
    assert!(entry.compact().contains("\"title\":\"Dune\""));
}

#[test]
fn set_with_auto_id_generates_the_next_id() {
    let store = setup();
    assert_eq!(store.next_id("book").expect("next_id"), 0);
    let key = store.set(None, &book(Id::Auto, "Dune", 412)).expect("set");
    assert_eq!(key, "book_0");
    store.set(None, &book(5, "Hyperion", 482)).expect("set");
    // gaps are never reused
    assert_eq!(store.next_id("book").expect("next_id"), 6);
    let key = store.set(None, &book(Id::Auto, "Solaris", 204)).expect("set");
    assert_eq!(key, "book_6");
    // text ids do not participate in generation
    store.set(None, &book("draft", "Untitled", 0)).expect("set");
    assert_eq!(store.next_id("book").expect("next_id"), 7);
}

#[test]
fn set_to_an_explicit_key_overwrites() {
    let store = setup();
    store.set(Some("shelf"), &book(1, "Dune", 412)).expect("set");
    store.set(Some("shelf"), &book(1, "Dune, annotated", 500)).expect("set");
    let decoded: Book = store.get_as("shelf").expect("get_as");
    assert_eq!(decoded.pages, 500);
    assert_eq!(store.count("book").expect("count"), 1);
}

#[test]
fn unregistered_kind_is_rejected_on_write() {
    #[derive(Serialize, Deserialize)]
    struct Song {
        id: Id,
    }
    impl Record for Song {
        const KIND: &'static str = "song";
        fn id(&self) -> &Id {
            &self.id
        }
    }
    let store = setup();
    let err = store.set(None, &Song { id: Id::Number(1) }).expect_err("unregistered");
    assert!(matches!(err, LarderError::UnregisteredKind { .. }), "got {err}");
}

#[test]
fn get_missing_key_is_an_error_and_exists_is_not() {
    let store = setup();
    let err = store.get("book_9").expect_err("missing key");
    assert!(matches!(err, LarderError::MissingKey { .. }), "got {err}");
    assert!(store.exists("book_9").is_none());
}

#[test]
fn keys_values_items_filter_by_kind() {
    let store = setup();
    store.set(None, &book(1, "Dune", 412)).expect("set");
    store.set(None, &book(2, "Hyperion", 482)).expect("set");
    store.set(None, &Tag::new(0, json!({"note": "read these"}))).expect("set");
    assert_eq!(store.keys(Some("book")).expect("keys"), vec!["book_1", "book_2"]);
    assert_eq!(store.keys(None).expect("keys").len(), 3);
    assert_eq!(store.keys(Some("all")).expect("keys").len(), 3);
    // an unregistered filter falls back to everything
    assert_eq!(store.keys(Some("song")).expect("keys").len(), 3);
    assert_eq!(store.count("book").expect("count"), 2);
    assert_eq!(store.count("tag").expect("count"), 1);
    let items = store.items(Some("tag")).expect("items");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].0, "tag_0");
    // tags unwrap to their payload
    assert_eq!(items[0].1.to_value(), json!({"note": "read these"}));
    assert_eq!(store.values(Some("book")).expect("values").len(), 2);
}

#[test]
fn is_unique_id_checks_the_unique_key() {
    let store = setup();
    store.set(None, &book(1, "Dune", 412)).expect("set");
    assert!(!store.is_unique_id("book", &Id::Number(1)));
    assert!(store.is_unique_id("book", &Id::Number(2)));
    assert!(store.is_unique_id("tag", &Id::Number(1)));
}

#[test]
fn make_once_writes_at_most_once() {
    let store = setup();
    assert!(store.make_once(None, &book(1, "Dune", 412)).expect("make_once"));
    assert!(!store.make_once(None, &book(1, "Dune, again", 9)).expect("make_once"));
    let decoded: Book = store.get_as("book_1").expect("get_as");
    assert_eq!(decoded.title, "Dune", "the first write must stand");
    // a generate-next id cannot derive a target key
    let err = store.make_once(None, &book(Id::Auto, "x", 0)).expect_err("no key");
    assert!(matches!(err, LarderError::Argument(_)), "got {err}");
    // unless an explicit key is given
    assert!(store.make_once(Some("slot"), &book(Id::Auto, "x", 0)).expect("make_once"));
}

#[test]
fn delete_moves_documents_into_the_bin() {
    let mut store = setup();
    store.set(None, &book(1, "Dune", 412)).expect("set");
    store.set(None, &book(2, "Hyperion", 482)).expect("set");
    store.delete(["book_1", "book_9"]).expect("delete");
    assert_eq!(store.count("book").expect("count"), 1);
    let binned = store.bin().get("book_1").expect("binned document");
    assert_eq!(binned.get("title"), Some(&json!("Dune")));
    // the missing key was silently skipped
    assert!(!store.bin().contains_key("book_9"));
    store.empty_bin();
    assert!(store.bin().is_empty());
}

#[test]
fn wipe_empties_without_binning() {
    let mut store = setup();
    store.set(None, &book(1, "Dune", 412)).expect("set");
    store.wipe().expect("wipe");
    assert_eq!(store.keys(None).expect("keys").len(), 0);
    assert!(store.bin().is_empty());
}

#[test]
fn untyped_documents_are_rejected_on_read() {
    let mut store = setup();
    let mut entries = serde_json::Map::new();
    entries.insert("odd".to_owned(), json!({"id": 1, "title": "no type"}));
    let err = store.import(entries, false).expect_err("untyped");
    assert!(matches!(err, LarderError::UntypedDocument), "got {err}");
}

#[test]
fn to_json_holds_every_raw_document() {
    let store = setup();
    store.set(None, &book(1, "Dune", 412)).expect("set");
    let json = store.to_json().expect("to_json");
    let doc = json.get("book_1").expect("document present");
    assert_eq!(doc.get("type"), Some(&json!("book")));
    assert_eq!(doc.get("title"), Some(&json!("Dune")));
}

#[test]
fn file_backed_store_persists_across_opens() {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = Settings { data_dir: dir.path().to_path_buf() };
    {
        let mut store = Store::open("library", &settings).expect("open");
        store.register::<Book>();
        store.set(None, &book(1, "Dune", 412)).expect("set");
        assert_eq!(store.name(), "library");
    }
    let mut store = Store::open("library", &settings).expect("reopen");
    store.register::<Book>();
    let decoded: Book = store.get_as("book_1").expect("get_as");
    assert_eq!(decoded.title, "Dune");
}
