use bookforge::db::{chapters, parts, Database};
use bookforge::models::*;
use chrono::Utc;
use speculate2::speculate;
use uuid::Uuid;

fn create_test_project(db: &Database) -> Project {
    db.create_project(CreateProjectInput {
        blueprint: "A history of cooperative machines.".to_string(),
    })
    .expect("Failed to create project")
}

fn create_test_part(db: &Database, project_id: Uuid, number: i64) -> Part {
    db.read(|conn| {
        parts::insert(
            conn,
            project_id,
            number,
            PartKind::Body,
            &format!("Part {}", number),
            Some("Summary"),
            PartStatus::Defined,
        )
    })
    .expect("Failed to create part")
}

fn create_test_chapter(db: &Database, part_id: Uuid, number: i64) -> Chapter {
    db.read(|conn| {
        chapters::insert(
            conn,
            part_id,
            number,
            &format!("Chapter {}", number),
            Some(&ChapterBrief {
                thesis: "Thesis".to_string(),
                ..Default::default()
            }),
            "Historian AI",
            ChapterStatus::BriefComplete,
        )
    })
    .expect("Failed to create chapter")
}

fn usage_entry(project_id: Uuid, nanos: u64) -> UsageLogEntry {
    UsageLogEntry {
        id: Uuid::new_v4(),
        project_id,
        phase_name: "chapter_content".to_string(),
        model_name: "gpt-4".to_string(),
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
        cost: Cost::from_nanos(nanos),
        created_at: Utc::now(),
    }
}

fn part_outline(n: i64) -> PartOutline {
    PartOutline {
        part_number: n,
        title: format!("Outline {}", n),
        summary: "Summary".to_string(),
    }
}

speculate! {
    before {
        let db = Database::open_memory().expect("Failed to create in-memory database");
        db.migrate().expect("Failed to run migrations");
    }

    describe "projects" {
        describe "create_project" {
            it "starts raw with no draft and zero cost" {
                let project = create_test_project(&db);

                assert_eq!(project.raw_blueprint, "A history of cooperative machines.");
                assert_eq!(project.status, ProjectStatus::Raw);
                assert!(project.draft.is_none());
                assert_eq!(project.total_cost, Cost::ZERO);
            }
        }

        describe "get_project" {
            it "returns None for non-existent project" {
                let result = db.get_project(Uuid::new_v4()).expect("Query failed");
                assert!(result.is_none());
            }

            it "returns the stored status" {
                let project = create_test_project(&db);
                db.read(|conn| bookforge::db::projects::set_status(conn, project.id, ProjectStatus::PartsValidated))
                    .expect("Failed to set status");

                let found = db.get_project(project.id).expect("Query failed").unwrap();
                assert_eq!(found.status, ProjectStatus::PartsValidated);
            }
        }

        describe "get_all_projects" {
            it "returns empty list when no projects exist" {
                let projects = db.get_all_projects().expect("Query failed");
                assert!(projects.is_empty());
            }

            it "returns projects in creation order" {
                let first = create_test_project(&db);
                let second = create_test_project(&db);

                let ids: Vec<Uuid> = db.get_all_projects().expect("Query failed")
                    .into_iter().map(|p| p.id).collect();
                assert_eq!(ids.len(), 2);
                assert!(ids.contains(&first.id));
                assert!(ids.contains(&second.id));
            }
        }

        describe "delete_project" {
            it "returns false for non-existent project" {
                assert!(!db.delete_project(Uuid::new_v4()).expect("Delete failed"));
            }

            it "cascades to parts, chapters, versions and usage" {
                let project = create_test_project(&db);
                let part = create_test_part(&db, project.id, 1);
                let chapter = create_test_chapter(&db, part.id, 1);
                db.read(|conn| {
                    bookforge::db::chapters::write_content(conn, chapter.id, "Text", None, ChapterStatus::ContentGenerated)?;
                    bookforge::db::usage::append(conn, &usage_entry(project.id, 10))
                }).expect("Failed to seed");

                assert!(db.delete_project(project.id).expect("Delete failed"));

                assert!(db.get_part(part.id).expect("Query failed").is_none());
                assert!(db.get_chapter(chapter.id).expect("Query failed").is_none());
                assert!(db.get_chapter_versions(chapter.id).expect("Query failed").is_empty());
                assert!(db.get_usage_log(project.id).expect("Query failed").is_empty());
            }
        }

        describe "get_project_with_parts" {
            it "nests chapters under their parts in order" {
                let project = create_test_project(&db);
                let second = create_test_part(&db, project.id, 2);
                let first = create_test_part(&db, project.id, 1);
                create_test_chapter(&db, first.id, 2);
                create_test_chapter(&db, first.id, 1);
                create_test_chapter(&db, second.id, 1);

                let tree = db.get_project_with_parts(project.id).expect("Query failed").unwrap();

                assert_eq!(tree.parts.len(), 2);
                assert_eq!(tree.parts[0].part.id, first.id);
                let numbers: Vec<i64> = tree.parts[0].chapters.iter().map(|c| c.chapter_number).collect();
                assert_eq!(numbers, vec![1, 2]);
                assert_eq!(tree.parts[1].chapters.len(), 1);
            }
        }
    }

    describe "drafts" {
        it "stores a parts draft" {
            let project = create_test_project(&db);
            let draft = DraftOutline::Parts(vec![part_outline(1), part_outline(2)]);
            db.read(|conn| bookforge::db::projects::set_draft(conn, project.id, &draft)).expect("Failed to set draft");

            let found = db.get_project(project.id).expect("Query failed").unwrap();
            assert_eq!(found.draft, draft);
        }

        it "keeps chapter drafts keyed by part" {
            let project = create_test_project(&db);
            let part_a = Uuid::new_v4();
            let part_b = Uuid::new_v4();
            let outline = ChapterOutline {
                chapter_number: 1,
                title: "Opening".to_string(),
                brief: ChapterBrief::default(),
                suggested_role: "Historian AI".to_string(),
            };
            let draft = DraftOutline::None
                .with_chapters_for(part_a, vec![outline.clone()])
                .with_chapters_for(part_b, vec![outline.clone(), outline]);
            db.read(|conn| bookforge::db::projects::set_draft(conn, project.id, &draft)).expect("Failed to set draft");

            let found = db.get_project(project.id).expect("Query failed").unwrap();
            assert_eq!(found.draft.chapters_for(part_a).map(|c| c.len()), Some(1));
            assert_eq!(found.draft.chapters_for(part_b).map(|c| c.len()), Some(2));
            assert!(found.draft.parts().is_none());
        }

        it "clears the draft" {
            let project = create_test_project(&db);
            db.read(|conn| {
                bookforge::db::projects::set_draft(conn, project.id, &DraftOutline::Parts(vec![part_outline(1)]))?;
                bookforge::db::projects::set_draft(conn, project.id, &DraftOutline::None)
            }).expect("Failed to set draft");

            let found = db.get_project(project.id).expect("Query failed").unwrap();
            assert!(found.draft.is_none());
        }
    }

    describe "parts" {
        describe "replace_all" {
            it "swaps every part for the validated outline" {
                let project = create_test_project(&db);
                let old = create_test_part(&db, project.id, 1);
                create_test_chapter(&db, old.id, 1);

                let created = db.read(|conn| {
                    bookforge::db::parts::replace_all(conn, project.id, &[part_outline(1), part_outline(2), part_outline(3)])
                }).expect("Failed to replace parts");

                assert_eq!(created.len(), 3);
                assert!(db.get_part(old.id).expect("Query failed").is_none());
                let stored = db.get_parts(project.id).expect("Query failed");
                assert_eq!(stored.len(), 3);
                assert!(stored.iter().all(|p| p.kind == PartKind::Body && p.status == PartStatus::Defined));
            }
        }

        describe "max_number_excluding" {
            it "ignores the excluded kind" {
                let project = create_test_project(&db);
                create_test_part(&db, project.id, 2);
                db.read(|conn| {
                    bookforge::db::parts::insert(conn, project.id, 9, PartKind::Conclusion, "Conclusion", None, PartStatus::ChaptersValidated)
                }).expect("Failed to insert conclusion");

                let max = db.read(|conn| bookforge::db::parts::max_number_excluding(conn, project.id, PartKind::Conclusion))
                    .expect("Query failed");
                assert_eq!(max, Some(2));
            }

            it "is None for a project without parts" {
                let project = create_test_project(&db);
                let max = db.read(|conn| bookforge::db::parts::max_number_excluding(conn, project.id, PartKind::Conclusion))
                    .expect("Query failed");
                assert_eq!(max, None);
            }
        }

        it "rejects a duplicate part number" {
            let project = create_test_project(&db);
            create_test_part(&db, project.id, 1);
            let duplicate = db.read(|conn| {
                bookforge::db::parts::insert(conn, project.id, 1, PartKind::Body, "Again", None, PartStatus::Defined)
            });
            assert!(duplicate.is_err());
        }
    }

    describe "chapters" {
        describe "write_content" {
            it "appends numbered versions and mirrors the latest" {
                let project = create_test_project(&db);
                let part = create_test_part(&db, project.id, 1);
                let chapter = create_test_chapter(&db, part.id, 1);

                for text in ["one", "two", "three"] {
                    db.read(|conn| bookforge::db::chapters::write_content(conn, chapter.id, text, Some(3), ChapterStatus::ContentGenerated))
                        .expect("Failed to write");
                }

                let versions = db.get_chapter_versions(chapter.id).expect("Query failed");
                let numbers: Vec<i64> = versions.iter().map(|v| v.version).collect();
                assert_eq!(numbers, vec![1, 2, 3]);
                let stored = db.get_chapter(chapter.id).expect("Query failed").unwrap();
                assert_eq!(stored.content.as_deref(), Some("three"));
                assert_eq!(stored.status, ChapterStatus::ContentGenerated);
            }

            it "fails for a missing chapter and leaves no version" {
                let missing = Uuid::new_v4();
                let result = db.transaction(|tx| {
                    bookforge::db::chapters::write_content(tx, missing, "text", None, ChapterStatus::ContentGenerated)
                });
                assert!(result.is_err());
                assert!(db.get_chapter_versions(missing).expect("Query failed").is_empty());
            }
        }

        describe "predecessor" {
            it "finds the closest lower-numbered chapter in the same part" {
                let project = create_test_project(&db);
                let part = create_test_part(&db, project.id, 1);
                let other = create_test_part(&db, project.id, 2);
                let first = create_test_chapter(&db, part.id, 1);
                let third = create_test_chapter(&db, part.id, 3);
                create_test_chapter(&db, other.id, 2);

                let before_third = db.read(|conn| bookforge::db::chapters::predecessor(conn, part.id, third.chapter_number))
                    .expect("Query failed");
                assert_eq!(before_third.map(|c| c.id), Some(first.id));

                let before_first = db.read(|conn| bookforge::db::chapters::predecessor(conn, part.id, 1))
                    .expect("Query failed");
                assert!(before_first.is_none());
            }
        }

        describe "written_in_project" {
            it "lists body chapters with content in reading order" {
                let project = create_test_project(&db);
                let second = create_test_part(&db, project.id, 2);
                let first = create_test_part(&db, project.id, 1);
                let late = create_test_chapter(&db, second.id, 1);
                let early = create_test_chapter(&db, first.id, 1);
                create_test_chapter(&db, first.id, 2);
                let intro = db.read(|conn| {
                    bookforge::db::parts::insert(conn, project.id, 0, PartKind::Introduction, "Introduction", None, PartStatus::ChaptersValidated)
                }).expect("Failed to insert introduction");
                let intro_chapter = create_test_chapter(&db, intro.id, 1);
                db.read(|conn| {
                    for id in [late.id, early.id, intro_chapter.id] {
                        bookforge::db::chapters::write_content(conn, id, "Some text", None, ChapterStatus::ContentGenerated)?;
                    }
                    Ok(())
                }).expect("Failed to write");

                let written = db.read(|conn| bookforge::db::chapters::written_in_project(conn, project.id))
                    .expect("Query failed");

                let ids: Vec<Uuid> = written.iter().map(|w| w.chapter.id).collect();
                assert_eq!(ids, vec![early.id, late.id]);
                assert_eq!(written[0].part_number, 1);
                assert_eq!(written[1].part_title, "Part 2");
            }
        }
    }

    describe "usage" {
        it "adds each entry to the running total" {
            let project = create_test_project(&db);
            db.read(|conn| {
                bookforge::db::usage::append(conn, &usage_entry(project.id, 1_250))?;
                bookforge::db::usage::append(conn, &usage_entry(project.id, 750))
            }).expect("Failed to append");

            let entries = db.get_usage_log(project.id).expect("Query failed");
            assert_eq!(entries.len(), 2);
            let found = db.get_project(project.id).expect("Query failed").unwrap();
            assert_eq!(found.total_cost, Cost::from_nanos(2_000));
        }

        it "saturates the running total instead of overflowing" {
            let project = create_test_project(&db);
            let near_max = i64::MAX as u64 - 10;
            db.read(|conn| {
                bookforge::db::usage::append(conn, &usage_entry(project.id, near_max))?;
                bookforge::db::usage::append(conn, &usage_entry(project.id, 1_000))
            }).expect("Failed to append");

            let found = db.get_project(project.id).expect("Query failed").unwrap();
            assert_eq!(found.total_cost, Cost::from_nanos(i64::MAX as u64));
            assert_eq!(db.get_all_projects().expect("Query failed").len(), 1);
        }

        it "rejects an entry for a missing project" {
            let result = db.transaction(|tx| bookforge::db::usage::append(tx, &usage_entry(Uuid::new_v4(), 5)));
            assert!(result.is_err());
        }
    }

    describe "transaction" {
        it "rolls back every write when the closure fails" {
            let project = create_test_project(&db);

            let result: anyhow::Result<()> = db.transaction(|tx| {
                bookforge::db::projects::set_status(tx, project.id, ProjectStatus::PartsPendingValidation)?;
                bookforge::db::usage::append(tx, &usage_entry(project.id, 100))?;
                anyhow::bail!("validation failed")
            });

            assert!(result.is_err());
            let found = db.get_project(project.id).expect("Query failed").unwrap();
            assert_eq!(found.status, ProjectStatus::Raw);
            assert_eq!(found.total_cost, Cost::ZERO);
            assert!(db.get_usage_log(project.id).expect("Query failed").is_empty());
        }
    }

    describe "file database" {
        it "persists across reopen" {
            let dir = tempfile::tempdir().expect("Failed to create temp dir");
            let path = dir.path().join("nested").join("book.db");

            let id = {
                let file_db = Database::open(path.clone()).expect("Failed to open");
                file_db.migrate().expect("Failed to migrate");
                create_test_project(&file_db).id
            };

            let reopened = Database::open(path).expect("Failed to reopen");
            reopened.migrate().expect("Failed to migrate again");
            assert!(reopened.get_project(id).expect("Query failed").is_some());
        }
    }
}
