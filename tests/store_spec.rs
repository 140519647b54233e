use speculate2::speculate;
use tether::db::Database;
use tether::error::Error;
use tether::models::*;

fn task_input(title: &str) -> CreateTaskInput {
    CreateTaskInput {
        title: title.to_string(),
        status: None,
        priority: None,
        due_at: None,
        metadata: None,
    }
}

fn skill_input(name: &str, prompt: Option<&str>) -> CreateSkillInput {
    CreateSkillInput {
        name: name.to_string(),
        command: None,
        description: None,
        prompt: prompt.map(String::from),
        code: None,
        tags: None,
    }
}

speculate! {
    before {
        let db = Database::open_memory().expect("Failed to create in-memory database");
        db.migrate().expect("Failed to run migrations");
    }

    describe "tasks" {
        describe "create_task" {
            it "creates a task with defaults" {
                let task = db.create_task(task_input("write docs")).expect("Failed to create task");

                assert_eq!(task.title, "write docs");
                assert_eq!(task.status, TaskStatus::Todo);
                assert_eq!(task.priority, 3);
                assert!(task.due_at.is_none());
            }

            it "honors explicit status and priority" {
                let task = db.create_task(CreateTaskInput {
                    title: "urgent fix".to_string(),
                    status: Some(TaskStatus::Doing),
                    priority: Some(1),
                    due_at: None,
                    metadata: Some("{\"area\":\"parser\"}".to_string()),
                }).expect("Failed to create task");

                assert_eq!(task.status, TaskStatus::Doing);
                assert_eq!(task.priority, 1);
                assert_eq!(task.metadata.as_deref(), Some("{\"area\":\"parser\"}"));
            }

            it "rejects an empty title" {
                let err = db.create_task(task_input("   ")).unwrap_err();
                assert!(matches!(err, Error::Validation(_)));
                assert!(db.list_tasks().expect("Query failed").is_empty());
            }

            it "assigns strictly increasing identifiers" {
                let first = db.create_task(task_input("one")).expect("Failed");
                let second = db.create_task(task_input("two")).expect("Failed");
                let third = db.create_task(task_input("three")).expect("Failed");

                assert!(second.id > first.id);
                assert!(third.id > second.id);
            }
        }

        describe "list_tasks" {
            it "returns tasks in storage order" {
                db.create_task(task_input("zebra")).expect("Failed");
                db.create_task(task_input("alpha")).expect("Failed");

                let tasks = db.list_tasks().expect("Query failed");
                assert_eq!(tasks.len(), 2);
                assert_eq!(tasks[0].title, "zebra");
                assert_eq!(tasks[1].title, "alpha");
            }
        }

        describe "toggle_task_status" {
            it "is an involution on todo and done" {
                let task = db.create_task(task_input("cycle me")).expect("Failed");

                let toggled = db.toggle_task_status(task.id).expect("Toggle failed");
                assert_eq!(toggled.status, TaskStatus::Done);

                let back = db.toggle_task_status(task.id).expect("Toggle failed");
                assert_eq!(back.status, TaskStatus::Todo);

                let again = db.toggle_task_status(task.id).expect("Toggle failed");
                assert_eq!(again.status, TaskStatus::Done);
            }

            it "completes every non-done status to done" {
                for status in [TaskStatus::Doing, TaskStatus::Blocked, TaskStatus::Dropped] {
                    let task = db.create_task(CreateTaskInput {
                        title: format!("{} task", status.as_str()),
                        status: Some(status),
                        priority: None,
                        due_at: None,
                        metadata: None,
                    }).expect("Failed");

                    let toggled = db.toggle_task_status(task.id).expect("Toggle failed");
                    assert_eq!(toggled.status, TaskStatus::Done);
                }
            }

            it "refreshes the updated timestamp" {
                let task = db.create_task(task_input("timely")).expect("Failed");
                let toggled = db.toggle_task_status(task.id).expect("Toggle failed");
                assert!(toggled.updated_at >= task.updated_at);
                assert_eq!(toggled.created_at, task.created_at);
            }

            it "fails with NotFound for an unknown id" {
                let err = db.toggle_task_status(9999).unwrap_err();
                assert!(matches!(err, Error::NotFound(_)));
            }
        }
    }

    describe "skills" {
        describe "upsert_skill" {
            it "creates a skill" {
                let skill = db.upsert_skill(skill_input("deploy", Some("run the deploy steps")))
                    .expect("Failed to create skill");

                assert_eq!(skill.name, "deploy");
                assert_eq!(skill.prompt.as_deref(), Some("run the deploy steps"));
            }

            it "replaces fields on name collision, last write wins" {
                let first = db.upsert_skill(skill_input("deploy", Some("old body")))
                    .expect("Failed");
                let second = db.upsert_skill(skill_input("deploy", Some("new body")))
                    .expect("Failed");

                assert_eq!(first.id, second.id);
                assert_eq!(second.prompt.as_deref(), Some("new body"));
                assert_eq!(second.created_at, first.created_at);
                assert!(second.updated_at >= first.updated_at);

                let skills = db.list_skills().expect("Query failed");
                assert_eq!(skills.len(), 1);
                assert_eq!(skills[0].prompt.as_deref(), Some("new body"));
            }

            it "rejects a blank name" {
                let err = db.upsert_skill(skill_input("", None)).unwrap_err();
                assert!(matches!(err, Error::Validation(_)));
            }
        }

        describe "list_skills" {
            it "returns all skills" {
                db.upsert_skill(skill_input("deploy", None)).expect("Failed");
                db.upsert_skill(skill_input("review", None)).expect("Failed");

                let skills = db.list_skills().expect("Query failed");
                assert_eq!(skills.len(), 2);
            }
        }
    }

    describe "sessions" {
        it "returns None when nothing was recorded" {
            assert!(db.latest_session().expect("Query failed").is_none());
        }

        it "latest is the most recent record" {
            db.record_session(Some("first".to_string()), None).expect("Failed");
            db.record_session(Some("second".to_string()), Some("backup_20260101_000000.zip".to_string()))
                .expect("Failed");

            let latest = db.latest_session().expect("Query failed").unwrap();
            assert_eq!(latest.summary.as_deref(), Some("second"));
            assert_eq!(latest.backup_ref.as_deref(), Some("backup_20260101_000000.zip"));
        }
    }
}
