mod common;

use weft_core::*;

#[test]
fn test_span_index_scenario() {
    common::init_tracing();

    let mut cas = Cas::new();
    let ts = cas.type_system_mut().unwrap();
    let span = ts.add_type("Span", TypeId::TOP).unwrap();
    let begin = ts.add_feature(span, "begin", TypeId::INTEGER).unwrap();
    let end = ts.add_feature(span, "end", TypeId::INTEGER).unwrap();
    cas.define_index(
        IndexSpec::sorted("SpanIndex", "Span")
            .key("begin", SortOrder::Ascending)
            .key("end", SortOrder::Descending),
    )
    .unwrap();
    cas.freeze_type_system().unwrap();

    let addr = cas.create_fs(span).unwrap();
    cas.set_slot(addr, begin, FeatureValue::Integer(5)).unwrap();
    cas.set_slot(addr, end, FeatureValue::Integer(9)).unwrap();
    cas.add_to_indexes(ViewId::BASE, addr).unwrap();

    let found: Vec<_> = cas.iterate(cas.base_view(), "SpanIndex").unwrap().collect();
    assert_eq!(found, vec![addr]);
    assert_eq!(cas.get_slot(found[0], begin).unwrap(), FeatureValue::Integer(5));
    assert_eq!(cas.get_slot(found[0], end).unwrap(), FeatureValue::Integer(9));
}

#[test]
fn test_view_lifecycle_errors() {
    let (mut cas, _, _) = common::token_engine();

    let en = cas.create_view("en").unwrap();
    assert_eq!(cas.view_id("en").unwrap(), en);
    assert_eq!(
        cas.create_view("en").unwrap_err(),
        WeftError::DuplicateViewName { name: "en".to_string() }
    );
    assert_eq!(
        cas.view_id("fr").unwrap_err(),
        WeftError::ViewNotFound { name: "fr".to_string() }
    );
    assert!(matches!(cas.create_view("with space"), Err(WeftError::InvalidViewName { .. })));
    assert!(matches!(
        cas.create_view("_InitialView"),
        Err(WeftError::DuplicateViewName { .. })
    ));

    let names: Vec<_> = cas.views().map(|(_, view)| view.name().to_string()).collect();
    assert_eq!(names, vec!["_InitialView", "en"]);
    assert_eq!(cas.view(en).unwrap().sofa_num(), 2);
}

#[test]
fn test_sofa_is_write_once() {
    let (mut cas, _, _) = common::token_engine();
    let view = cas.create_view("en").unwrap();

    cas.set_document_text(view, "The cat sat.").unwrap();
    assert!(matches!(
        cas.set_document_text(view, "Another text"),
        Err(WeftError::SofaAlreadySet { .. })
    ));
    assert!(matches!(
        cas.set_sofa_data_uri(view, "file:///cat.txt", "text/plain"),
        Err(WeftError::SofaAlreadySet { .. })
    ));
    assert_eq!(cas.document_text(view).unwrap(), Some("The cat sat."));

    // Other views are unaffected
    cas.set_sofa_data_uri(ViewId::BASE, "file:///cat.txt", "text/plain").unwrap();
    assert_eq!(cas.sofa_data_uri(ViewId::BASE).unwrap(), Some("file:///cat.txt"));
}

#[test]
fn test_reset_invalidates_everything() {
    let (mut cas, token, pos) = common::token_engine();
    let other = cas.create_view("other").unwrap();

    let a = cas.create_annotation(token, 0, 3).unwrap();
    let b = cas.create_annotation(token, 4, 7).unwrap();
    let c = cas.create_fs(token).unwrap();
    cas.add_to_indexes(ViewId::BASE, a).unwrap();
    cas.add_to_indexes(other, b).unwrap();
    assert_eq!(cas.heap_len(), 3);
    let generation = cas.generation();

    cas.reset();

    for addr in [a, b, c] {
        assert!(matches!(cas.type_of(addr), Err(WeftError::StaleAddress { .. })));
        assert!(matches!(cas.get_slot(addr, pos), Err(WeftError::StaleAddress { .. })));
    }
    assert!(matches!(
        cas.add_to_indexes(ViewId::BASE, a),
        Err(WeftError::StaleAddress { .. })
    ));
    assert_eq!(cas.annotation_iterator(ViewId::BASE).unwrap().len(), 0);
    assert_eq!(cas.annotation_iterator(other).unwrap().len(), 0);
    assert_eq!(cas.heap_len(), 0);
    assert_ne!(cas.generation(), generation);

    // The type system and named views survive
    assert_eq!(cas.view_id("other").unwrap(), other);
    assert!(cas.is_frozen());
    let fresh = cas.create_annotation(token, 0, 1).unwrap();
    cas.add_to_indexes(other, fresh).unwrap();
    assert_eq!(cas.index_size(other, "AnnotationIndex").unwrap(), 1);
}

#[test]
fn test_reset_clears_sofas_and_document_annotations() {
    let (mut cas, _, _) = common::token_engine();
    let view = cas.create_view("de").unwrap();
    cas.set_document_text(ViewId::BASE, "base").unwrap();
    cas.set_document_text(view, "Hallo").unwrap();
    cas.set_document_language(view, "de").unwrap();
    let old_document = cas.document_annotation(view).unwrap();

    cas.reset();

    assert_eq!(cas.document_text(ViewId::BASE).unwrap(), None);
    assert_eq!(cas.document_text(view).unwrap(), None);
    assert_eq!(cas.document_language(view).unwrap(), "x-unspecified");

    cas.set_document_text(view, "Neu").unwrap();
    let new_document = cas.document_annotation(view).unwrap();
    assert_ne!(new_document, old_document);
    assert_eq!(cas.covered_text(view, new_document).unwrap(), "Neu");
}

#[test]
fn test_empty_array_singletons_across_reset() {
    let (mut cas, _, _) = common::token_engine();

    let mut before = Vec::new();
    for kind in ArrayKind::ALL {
        let first = cas.allocate_array(kind, 0).unwrap();
        assert_eq!(cas.allocate_array(kind, 0).unwrap(), first);
        assert_eq!(cas.empty_array(kind).unwrap(), first);
        assert_eq!(cas.array_len(first).unwrap(), 0);
        before.push(first);
    }

    cas.reset();

    for (kind, old) in ArrayKind::ALL.into_iter().zip(before) {
        let fresh = cas.allocate_array(kind, 0).unwrap();
        assert_ne!(fresh, old);
        assert_eq!(cas.array_len(fresh).unwrap(), 0);
    }
}

#[test]
fn test_array_access_reports_index_and_length() {
    let (mut cas, token, _) = common::token_engine();
    let strings = cas.allocate_array(ArrayKind::String, 2).unwrap();
    cas.array_set(strings, 0, FeatureValue::from("a")).unwrap();

    let err = cas.array_get(strings, 2).unwrap_err();
    assert_eq!(err, WeftError::ArrayIndexOutOfBounds { addr: strings, index: 2, length: 2 });

    let refs = cas.allocate_array(ArrayKind::FeatureStructure, 1).unwrap();
    let target = cas.create_fs(token).unwrap();
    cas.array_set(refs, 0, FeatureValue::Ref(target)).unwrap();
    assert_eq!(cas.array_elements(refs).unwrap(), vec![FeatureValue::Ref(target)]);
}

#[test]
fn test_filtered_iteration_over_annotation_index() {
    let (mut cas, token, pos) = common::token_engine();
    cas.set_document_text(ViewId::BASE, "the big dog barked").unwrap();

    let words = [(0, 3, "DT"), (4, 7, "JJ"), (8, 11, "NN"), (12, 18, "VBD")];
    for (begin, end, tag) in words {
        let addr = cas.create_annotation(token, begin, end).unwrap();
        cas.set_slot(addr, pos, FeatureValue::from(tag)).unwrap();
        cas.add_to_indexes(ViewId::BASE, addr).unwrap();
    }

    let pos_path = FeaturePath::parse(cas.type_system(), token, "pos").unwrap();
    let content_words = Constraint::and(vec![
        Constraint::is_type(token),
        Constraint::not(Constraint::eq(pos_path.clone(), "DT")),
        Constraint::compare(pos_path, Operator::NotEqual, "VBD"),
    ]);

    let base = cas.annotation_iterator(ViewId::BASE).unwrap();
    let covered: Vec<_> = cas
        .filtered_iterate(base, &content_words)
        .map(|addr| cas.covered_text(ViewId::BASE, addr).unwrap())
        .collect();
    assert_eq!(covered, vec!["big", "dog"]);

    let nothing = Constraint::eq(FeaturePath::single(FeatureId::ANNOTATION_BEGIN), -1);
    let base = cas.annotation_iterator(ViewId::BASE).unwrap();
    assert_eq!(cas.filtered_iterate(base, &nothing).count(), 0);
}

#[test]
fn test_annotation_cover_accessors() {
    let (mut cas, token, _) = common::token_engine();
    cas.set_document_text(ViewId::BASE, "hello world").unwrap();
    let addr = cas.create_annotation(token, 0, 5).unwrap();
    cas.add_to_indexes(ViewId::BASE, addr).unwrap();

    let cover = cas.cover::<AnnotationCover>(addr).unwrap();
    assert_eq!(cover.covered_text(&cas, ViewId::BASE).unwrap(), "hello");

    cover.set_span(&mut cas, 6, 11).unwrap();
    assert_eq!(cover.covered_text(&cas, ViewId::BASE).unwrap(), "world");
    assert_eq!((cover.begin(&cas).unwrap(), cover.end(&cas).unwrap()), (6, 11));

    // The document annotation (0..11) now sorts first
    let first = cas.annotation_iterator(ViewId::BASE).unwrap().next().unwrap();
    assert_eq!(first, cas.document_annotation(ViewId::BASE).unwrap());
}

#[test]
fn test_shared_engine_across_threads() {
    let shared = Cas::new_shared(CasConfig::default()).unwrap();
    {
        let mut cas = shared.write().unwrap();
        let ts = cas.type_system_mut().unwrap();
        ts.add_type("Token", TypeId::ANNOTATION).unwrap();
        cas.freeze_type_system().unwrap();
    }

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let shared = std::sync::Arc::clone(&shared);
            std::thread::spawn(move || {
                let mut cas = shared.write().unwrap();
                let token = cas.type_system().type_by_name("Token").unwrap();
                let addr = cas.create_annotation(token, i, i + 1).unwrap();
                cas.add_to_indexes(ViewId::BASE, addr).unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let cas = shared.read().unwrap();
    let begins: Vec<_> = cas
        .annotation_iterator(ViewId::BASE)
        .unwrap()
        .map(|addr| cas.get_slot(addr, FeatureId::ANNOTATION_BEGIN).unwrap())
        .collect();
    assert_eq!(begins, (0..4).map(FeatureValue::Integer).collect::<Vec<_>>());
}

#[test]
fn test_lenient_feature_probe() {
    let (cas, token, pos) = common::token_engine();
    let ts = cas.type_system();
    let mut diagnostics = Diagnostics::new();

    assert_eq!(
        ts.resolve_feature_lenient(token, "pos", Some("uima.cas.String"), &mut diagnostics),
        Some(pos)
    );
    assert_eq!(ts.resolve_feature_lenient(token, "lemma", None, &mut diagnostics), None);
    assert_eq!(
        ts.resolve_feature_lenient(token, "pos", Some("uima.cas.Integer"), &mut diagnostics),
        None
    );
    assert_eq!(diagnostics.len(), 2);
    assert!(matches!(diagnostics.errors()[0], WeftError::FeatureNotFound { .. }));
}
