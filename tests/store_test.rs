use serde_json::json;
use std::sync::Arc;
use std::thread;
use survey::error::SurveyError;
use survey::field::{Field, FieldKind};
use survey::store::SurveyStore;
use survey::survey::Survey;
use tempfile::tempdir;

fn sample_survey(owner: Option<&str>) -> Survey {
    Survey::new(
        "Office move",
        owner.map(str::to_string),
        vec![
            Field::text("Name").unwrap(),
            Field::new(
                "Floor",
                FieldKind::Select,
                vec!["1".to_string(), "2".to_string()],
                true,
            )
            .unwrap(),
            Field::new("Moving day", FieldKind::Date, Vec::new(), false).unwrap(),
        ],
    )
}

#[test]
fn survey_is_persisted_and_loaded_back() {
    let dir = tempdir().unwrap();
    let store = SurveyStore::open(dir.path()).unwrap();
    let survey = sample_survey(None);

    store.create(&survey, b"label,type\n", "csv").unwrap();

    assert!(store.exists(&survey.id));
    assert_eq!(store.load(&survey.id).unwrap(), survey);
    assert!(
        dir.path()
            .join("surveys")
            .join(&survey.id)
            .join("source.csv")
            .is_file()
    );
}

#[test]
fn unknown_and_malformed_ids_are_not_found() {
    let dir = tempdir().unwrap();
    let store = SurveyStore::open(dir.path()).unwrap();

    assert!(matches!(store.load("nope"), Err(SurveyError::NotFound(_))));
    assert!(matches!(
        store.load("../../etc"),
        Err(SurveyError::NotFound(_))
    ));
    assert!(!store.exists("../surveys"));
    assert!(matches!(
        store.responses("nope"),
        Err(SurveyError::NotFound(_))
    ));
}

#[test]
fn responses_are_appended_in_submission_order() {
    let dir = tempdir().unwrap();
    let store = SurveyStore::open(dir.path()).unwrap();
    let survey = sample_survey(None);
    store.create(&survey, b"x", "xlsx").unwrap();

    assert!(store.responses(&survey.id).unwrap().is_empty());

    for name in ["Ada", "Bob", "Cy"] {
        let body = json!({ "Name": name, "Floor": "2" });
        let response = survey.build_response(body.as_object().unwrap()).unwrap();
        store.append_response(&response).unwrap();
    }

    let names: Vec<String> = store
        .responses(&survey.id)
        .unwrap()
        .into_iter()
        .map(|r| r.answers["Name"].clone())
        .collect();
    assert_eq!(names, vec!["Ada", "Bob", "Cy"]);
}

#[test]
fn response_for_missing_survey_is_rejected() {
    let dir = tempdir().unwrap();
    let store = SurveyStore::open(dir.path()).unwrap();
    let survey = sample_survey(None);

    let response = survey
        .build_response(json!({ "Name": "Ada" }).as_object().unwrap())
        .unwrap();

    assert!(matches!(
        store.append_response(&response),
        Err(SurveyError::NotFound(_))
    ));
    assert!(!dir.path().join("surveys").join(&survey.id).exists());
}

#[test]
fn concurrent_submissions_are_all_kept() {
    let dir = tempdir().unwrap();
    let store = Arc::new(SurveyStore::open(dir.path()).unwrap());
    let survey = Arc::new(sample_survey(None));
    store.create(&survey, b"x", "xlsx").unwrap();

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let store = Arc::clone(&store);
            let survey = Arc::clone(&survey);
            thread::spawn(move || {
                for i in 0..25 {
                    let body = json!({ "Name": format!("{}-{}", t, i) });
                    let response = survey.build_response(body.as_object().unwrap()).unwrap();
                    store.append_response(&response).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let responses = store.responses(&survey.id).unwrap();
    assert_eq!(responses.len(), 200);
}

#[test]
fn owner_index_tracks_create_and_delete() {
    let dir = tempdir().unwrap();
    let store = SurveyStore::open(dir.path()).unwrap();
    let first = sample_survey(Some("ada"));
    let second = sample_survey(Some("ada"));
    store.create(&first, b"x", "xlsx").unwrap();
    store.create(&second, b"x", "xlsx").unwrap();
    store
        .append_response(
            &first
                .build_response(json!({ "Name": "Bob" }).as_object().unwrap())
                .unwrap(),
        )
        .unwrap();

    let ids: Vec<String> = store.list("ada").unwrap().into_iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![first.id.clone(), second.id.clone()]);
    assert!(store.list("bob").unwrap().is_empty());

    store.delete(&first.id).unwrap();

    assert!(!store.exists(&first.id));
    assert!(matches!(
        store.responses(&first.id),
        Err(SurveyError::NotFound(_))
    ));
    let ids: Vec<String> = store.list("ada").unwrap().into_iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![second.id]);
}

#[test]
fn racing_deletes_remove_once_and_report_not_found() {
    let dir = tempdir().unwrap();
    let store = Arc::new(SurveyStore::open(dir.path()).unwrap());
    let survey = sample_survey(Some("ada"));
    store.create(&survey, b"x", "xlsx").unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            let id = survey.id.clone();
            thread::spawn(move || store.delete(&id))
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        results
            .iter()
            .filter(|r| r.is_err())
            .all(|r| matches!(r, Err(SurveyError::NotFound(_))))
    );
    assert!(store.list("ada").unwrap().is_empty());
}
