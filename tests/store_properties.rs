//! 错题存储的行为测试：增删改查、筛选、随机抽取

use std::collections::HashSet;

use assert_matches::assert_matches;
use chrono::Local;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tempfile::TempDir;

use insight_folio_lib::{FolioError, MistakeDraft, MistakeFilters, MistakeStore};

fn open_store() -> (TempDir, MistakeStore) {
    let tmp = TempDir::new().unwrap();
    let store = MistakeStore::open(&tmp.path().join("data").join("qisilu.db")).unwrap();
    (tmp, store)
}

fn draft(subject: &str, question: &str) -> MistakeDraft {
    MistakeDraft {
        subject: subject.to_string(),
        grade: "8年级".to_string(),
        semester: "上册".to_string(),
        question_desc: question.to_string(),
        question_image: None,
        correct_answer: Some("$F=ma$".to_string()),
        mistake_reason: Some("单位换算错误".to_string()),
    }
}

#[test]
fn add_then_get_round_trips() {
    let (_tmp, store) = open_store();
    let submitted = draft("Physics", "求加速度 $a$\n第二问");
    let id = store.add(&submitted).unwrap();

    let record = store.get_by_id(id).unwrap().expect("record exists");
    assert_eq!(record.id, id);
    assert_eq!(record.to_draft(), submitted);
    assert_eq!(record.record_date, Local::now().date_naive());
    assert_eq!(record.review_count, 0);
    assert!(record.last_review_date.is_none());
}

#[test]
fn blank_optional_fields_round_trip_exactly() {
    let (_tmp, store) = open_store();
    let mut d = draft("数学", "q");
    d.correct_answer = Some("   ".to_string());
    d.mistake_reason = Some(String::new());
    d.question_image = Some(" ".to_string());
    let record = store.get_by_id(store.add(&d).unwrap()).unwrap().unwrap();
    assert_eq!(record.to_draft(), d);
}

#[test]
fn missing_required_field_is_rejected_without_insert() {
    let (_tmp, store) = open_store();
    let mut d = draft("数学", "q");
    d.grade = String::new();
    assert_matches!(store.add(&d), Err(FolioError::Validation(msg)) if msg.contains("grade"));
    assert_eq!(store.count(&MistakeFilters::default()).unwrap(), 0);
}

#[test]
fn empty_filters_list_everything_newest_first() {
    let (_tmp, store) = open_store();
    let ids: Vec<i64> = (0..4)
        .map(|i| store.add(&draft("数学", &format!("q{}", i))).unwrap())
        .collect();

    let listed: Vec<i64> = store
        .list(&MistakeFilters::default())
        .unwrap()
        .iter()
        .map(|r| r.id)
        .collect();
    let mut expected = ids.clone();
    expected.reverse();
    assert_eq!(listed, expected);
}

#[test]
fn filters_match_case_insensitive_substrings() {
    let (_tmp, store) = open_store();
    store.add(&draft("Physics", "力学")).unwrap();
    store.add(&draft("Chemistry", "配平")).unwrap();
    store.add(&draft("physical education", "跳远")).unwrap();

    let hits = store
        .list(&MistakeFilters::default().subject("phys"))
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|r| r.subject.to_lowercase().contains("phys")));

    let combined = store
        .list(&MistakeFilters::default().subject("PHYS").question_desc("力"))
        .unwrap();
    assert_eq!(combined.len(), 1);
    assert_eq!(combined[0].subject, "Physics");

    // 空字符串不参与筛选
    assert_eq!(
        store
            .list(&MistakeFilters::default().grade(""))
            .unwrap()
            .len(),
        3
    );
}

#[test]
fn wildcard_characters_match_literally() {
    let (_tmp, store) = open_store();
    store.add(&draft("数学", "增长 50% 的题")).unwrap();
    store.add(&draft("数学", "普通题目")).unwrap();
    store.add(&draft("数学", "变量 a_1")).unwrap();

    let percent = store
        .list(&MistakeFilters::default().question_desc("%"))
        .unwrap();
    assert_eq!(percent.len(), 1);

    let underscore = store
        .list(&MistakeFilters::default().question_desc("_"))
        .unwrap();
    assert_eq!(underscore.len(), 1);
    assert!(underscore[0].question_desc.contains("a_1"));
}

#[test]
fn update_keeps_identity_and_date() {
    let (_tmp, store) = open_store();
    let id = store.add(&draft("数学", "旧题")).unwrap();
    let before = store.get_by_id(id).unwrap().unwrap();

    let mut changed = before.to_draft();
    changed.question_desc = "新题".to_string();
    changed.correct_answer = None;
    store.update(id, &changed).unwrap();

    let after = store.get_by_id(id).unwrap().unwrap();
    assert_eq!(after.id, before.id);
    assert_eq!(after.record_date, before.record_date);
    assert_eq!(after.question_desc, "新题");
    assert!(after.correct_answer.is_none());

    assert_matches!(store.update(id + 100, &changed), Err(FolioError::NotFound(_)));
}

#[test]
fn delete_is_idempotent() {
    let (_tmp, store) = open_store();
    let id = store.add(&draft("数学", "q")).unwrap();
    store.delete(id).unwrap();
    assert!(store.get_by_id(id).unwrap().is_none());
    store.delete(id).unwrap();
    store.delete(9999).unwrap();
}

#[test]
fn sample_is_bounded_by_matches_and_distinct() {
    let (_tmp, store) = open_store();
    for i in 0..3 {
        store.add(&draft("数学", &format!("q{}", i))).unwrap();
    }
    store.add(&draft("英语", "other")).unwrap();

    let filters = MistakeFilters::default().subject("数学");
    let sample = store.sample_random(5, &filters).unwrap();
    assert_eq!(sample.len(), 3);
    let ids: HashSet<i64> = sample.iter().map(|r| r.id).collect();
    assert_eq!(ids.len(), 3);
    assert!(sample.iter().all(|r| r.subject == "数学"));

    assert!(store.sample_random(0, &filters).unwrap().is_empty());
    assert!(store.sample_random(-3, &filters).unwrap().is_empty());
    assert_eq!(store.sample_random(2, &filters).unwrap().len(), 2);
}

#[test]
fn seeded_sampling_is_reproducible() {
    let (_tmp, store) = open_store();
    for i in 0..10 {
        store.add(&draft("数学", &format!("q{}", i))).unwrap();
    }
    let filters = MistakeFilters::default();
    let pick = |seed: u64| -> Vec<i64> {
        store
            .sample_random_with_rng(4, &filters, &mut StdRng::seed_from_u64(seed))
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect()
    };
    assert_eq!(pick(42), pick(42));
}

#[test]
fn statistics_count_images() {
    let (_tmp, store) = open_store();
    let mut with_image = draft("数学", "q");
    with_image.question_image = Some("/tmp/whatever.png".to_string());
    store.add(&with_image).unwrap();
    store.add(&draft("数学", "q2")).unwrap();
    let mut blank_image = draft("数学", "q3");
    blank_image.question_image = Some(String::new());
    store.add(&blank_image).unwrap();

    let stats = store.statistics().unwrap();
    assert_eq!(stats.record_count, 3);
    assert_eq!(stats.with_image_count, 1);
}
