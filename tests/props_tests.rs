#![allow(
    clippy::expect_used,
    reason = "property table tests use expect for descriptive failures"
)]

//! Tests for induced-property propagation along a small build graph.

use buildsig::diagnostics::{
    AdditionType, DISABLED, DebugContext, DebugEvent, DebugNodeId, JsonLinesSink, MemorySink,
};
use buildsig::props::{Intent, Intents, NodeProperties, PropertyType};
use indexmap::IndexSet;
use rstest::{fixture, rstest};

const INCLUDES: PropertyType = PropertyType::new(1, Intent::InducedDeps);
const PEERDIRS: PropertyType = PropertyType::new(2, Intent::ModuleProps);
const TOOLS: PropertyType = PropertyType::new(3, Intent::CommandProps);

fn handle<'d>(name: &str, ctx: &'d DebugContext) -> NodeProperties<'d> {
    NodeProperties::new(DebugNodeId::new(name, None), ctx)
}

/// `util.h` includes `base.h`; `main.c` includes `util.h`.
#[fixture]
fn header() -> NodeProperties<'static> {
    let mut header = handle("util.h", &DISABLED);
    header.add_all(INCLUDES, &[10, 11], AdditionType::Created);
    header.add_one(PEERDIRS, 40, AdditionType::Created);
    header
}

#[rstest]
fn unchanged_propagation_shares_one_table(header: NodeProperties<'static>) {
    let mut source = handle("main.c", &DISABLED);
    source.copy_from(&header, Intents::ALL, None);
    let mut object = handle("main.o", &DISABLED);
    object.copy_from(&source, Intents::ALL, None);

    assert!(object.shares_with(&header));
    assert!(source.shares_with(&header));
    assert_eq!(*object.get(INCLUDES), [10, 11]);
}

#[rstest]
fn divergent_write_copies_only_the_writer(header: NodeProperties<'static>) {
    let mut source = handle("main.c", &DISABLED);
    source.copy_from(&header, Intents::ALL, None);
    let mut sibling = handle("other.c", &DISABLED);
    sibling.copy_from(&header, Intents::ALL, None);

    source.add_one(INCLUDES, 12, AdditionType::FromNode);

    assert!(!source.shares_with(&header));
    assert!(sibling.shares_with(&header));
    assert_eq!(*header.get(INCLUDES), [10, 11]);
    assert_eq!(*sibling.get(INCLUDES), [10, 11]);
    assert_eq!(*source.get(INCLUDES), [10, 11, 12]);
}

#[rstest]
#[case(Intents::of(&[Intent::InducedDeps]), true, false)]
#[case(Intents::of(&[Intent::ModuleProps]), false, true)]
#[case(Intents::NONE, false, false)]
fn intents_select_inherited_properties(
    header: NodeProperties<'static>,
    #[case] intents: Intents,
    #[case] has_includes: bool,
    #[case] has_peerdirs: bool,
) {
    let mut source = handle("main.c", &DISABLED);
    source.copy_from(&header, intents, None);
    assert_eq!(source.has(INCLUDES), has_includes);
    assert_eq!(source.has(PEERDIRS), has_peerdirs);
    assert!(!source.shares_with(&header));
}

#[rstest]
fn skip_list_blocks_selected_types(header: NodeProperties<'static>) {
    let skip = IndexSet::from([PEERDIRS]);
    let mut source = handle("main.c", &DISABLED);
    source.add_one(TOOLS, 7, AdditionType::Created);
    source.copy_from(&header, Intents::ALL, Some(&skip));
    assert_eq!(*source.get(INCLUDES), [10, 11]);
    assert_eq!(*source.get(TOOLS), [7]);
    assert!(!source.has(PEERDIRS));
}

#[test]
fn provenance_records_copies_and_clears() {
    let sink = MemorySink::default();
    let ctx = DebugContext::new(sink.clone());
    let mut header = handle("util.h", &ctx);
    header.add_one(INCLUDES, 10, AdditionType::Created);
    let mut source = handle("main.c", &ctx);
    source.copy_from(&header, Intents::ALL, None);
    source.clear(INCLUDES);

    let kinds: Vec<String> = sink
        .events()
        .into_iter()
        .map(|(_, event)| match event {
            DebugEvent::PropertyAdd { addition, .. } => format!("add:{addition:?}"),
            DebugEvent::PropertyClear { .. } => "clear".to_owned(),
            other => format!("{other:?}"),
        })
        .collect();
    assert_eq!(kinds, ["add:Created", "add:Copied", "clear"]);
    assert_eq!(*header.get(INCLUDES), [10]);
}

#[test]
fn json_lines_sink_writes_one_record_per_event() {
    let log = tempfile::NamedTempFile::new().expect("temp file");
    {
        let writer = log.reopen().expect("reopen log");
        let ctx = DebugContext::new(JsonLinesSink::new(writer));
        let mut node = handle("main.c", &ctx);
        node.add_all(INCLUDES, &[1, 2], AdditionType::Created);
        node.clear_all();
    }
    let text = std::fs::read_to_string(log.path()).expect("read log");
    let events: Vec<serde_json::Value> = text
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect();
    assert_eq!(events.len(), 3);
    assert_eq!(
        events.last().and_then(|e| e.get("event")).and_then(|e| e.as_str()),
        Some("property_clear")
    );
    assert!(events.iter().all(|e| e.get("seq").is_some()));
}
