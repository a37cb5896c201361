//! Integration tests for the customer consistency and query layer.
//!
//! Tests: CustomerService → UniquenessValidator / version guard → InMemoryCustomerStore
//!
//! Verifies:
//! - Created aggregates read back unchanged at version 0
//! - Stale or missing version tokens never mutate state
//! - Duplicate emails / phone numbers are rejected without partial writes
//! - Bulk operations are all-or-nothing
//! - Filters use existence semantics over nested collections

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;

    use customerhub_core::{
        AggregateRoot, CustomerId, DomainError, ErrorKind, SystemAuditor, VersionToken,
    };
    use customerhub_customers::{
        AddressInput, AddressType, CommunicationInput, CreateCustomer, CustomerFilter,
        PersonData, PhoneInput, PhoneType, UpdateCustomer, UpdateCustomerItem,
    };

    use crate::customer_service::CustomerService;
    use crate::error::ServiceError;
    use crate::store::{InMemoryCustomerStore, PageRequest, Sort, SortField};

    type Service = CustomerService<Arc<InMemoryCustomerStore>, SystemAuditor>;

    fn setup() -> Service {
        customerhub_observability::init_for_tests();
        CustomerService::new(Arc::new(InMemoryCustomerStore::new()), SystemAuditor::default())
    }

    fn address(city: &str) -> AddressInput {
        AddressInput {
            address_type: AddressType::Delivery,
            street: "Friedrichstrasse".to_string(),
            number: Some("12".to_string()),
            postal: "10117".to_string(),
            city: city.to_string(),
        }
    }

    fn communication(email: &str, phones: &[&str]) -> CommunicationInput {
        CommunicationInput {
            email: email.to_string(),
            phones: phones
                .iter()
                .map(|number| PhoneInput {
                    phone_type: PhoneType::Private,
                    phone_number: number.to_string(),
                })
                .collect(),
        }
    }

    fn new_customer(name: &str, email: &str, phone: &str) -> CreateCustomer {
        CreateCustomer {
            person: PersonData {
                name: name.to_string(),
                first_name: "Max".to_string(),
                date_of_birth: NaiveDate::from_ymd_opt(1979, 11, 2),
            },
            addresses: vec![address("Hamburg")],
            communications: vec![communication(email, &[phone])],
        }
    }

    fn first_page(size: u32) -> PageRequest {
        PageRequest::new(0, size, Sort::default()).unwrap()
    }

    async fn count(service: &Service) -> u64 {
        service.get_all(&first_page(50)).await.unwrap().total_elements
    }

    fn domain(err: ServiceError) -> DomainError {
        match err {
            ServiceError::Domain(err) => err,
            ServiceError::Store(err) => panic!("unexpected store failure: {err}"),
        }
    }

    #[tokio::test]
    async fn created_customer_reads_back_at_initial_version() {
        let service = setup();
        let input = new_customer("Mustermann", "max@example.com", "+49 170 1");

        let created = service.create(input.clone()).await.unwrap();
        let loaded = service.get_by_id(created.body.id_typed()).await.unwrap();

        assert_eq!(loaded.version, 0);
        assert_eq!(loaded.token(), VersionToken::for_version(0));
        let customer = loaded.body;
        assert_eq!(customer.name(), input.person.name);
        assert_eq!(customer.first_name(), input.person.first_name);
        assert_eq!(customer.date_of_birth(), input.person.date_of_birth);
        assert_eq!(customer.addresses().len(), 1);
        assert_eq!(customer.addresses()[0].city, "Hamburg");
        assert_eq!(customer.communications()[0].email, "max@example.com");
        assert_eq!(customer.communications()[0].phones[0].phone_number, "+49 170 1");
        assert_eq!(customer.created().by, "system");
        assert!(customer.modified().at >= customer.created().at);
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let err = setup().get_by_id(CustomerId::new()).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::NotFound));
        assert_eq!(err.code(), "CUSTOMERS_ERR_1401_CUSTOMER_NOT_FOUND");
    }

    #[tokio::test]
    async fn version_advances_and_stale_token_is_rejected() {
        let service = setup();
        let id = service
            .create(new_customer("Muster", "a@x.com", "1"))
            .await
            .unwrap()
            .body
            .id_typed();

        let rename = UpdateCustomer {
            name: Some("Neumann".to_string()),
            ..UpdateCustomer::default()
        };
        let updated = service.update(id, rename, Some("\"0\"")).await.unwrap();
        assert_eq!(updated.version, 1);
        assert_eq!(updated.token().to_string(), "\"1\"");

        let stale = UpdateCustomer {
            name: Some("Altmann".to_string()),
            ..UpdateCustomer::default()
        };
        let err = service.update(id, stale, Some("\"0\"")).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::PreconditionFailed));
        assert!(matches!(
            domain(err),
            DomainError::VersionConflict { current: 1, .. }
        ));

        let stored = service.get_by_id(id).await.unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.body.name(), "Neumann");
    }

    #[tokio::test]
    async fn malformed_token_is_a_conflict_and_changes_nothing() {
        let service = setup();
        let id = service
            .create(new_customer("Muster", "a@x.com", "1"))
            .await
            .unwrap()
            .body
            .id_typed();

        let update = UpdateCustomer {
            name: Some("Neu".to_string()),
            ..UpdateCustomer::default()
        };
        let err = service.update(id, update, Some("v0")).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::PreconditionFailed));
        assert_eq!(service.get_by_id(id).await.unwrap().body.name(), "Muster");
    }

    #[tokio::test]
    async fn weak_and_bare_tokens_are_accepted() {
        let service = setup();
        let id = service
            .create(new_customer("Muster", "a@x.com", "1"))
            .await
            .unwrap()
            .body
            .id_typed();

        let updated = service
            .update(id, UpdateCustomer::default(), Some("W/\"0\""))
            .await
            .unwrap();
        let updated = service
            .update(id, UpdateCustomer::default(), Some(updated.version.to_string().as_str()))
            .await
            .unwrap();
        assert_eq!(updated.version, 2);
    }

    #[tokio::test]
    async fn email_taken_by_another_customer_is_rejected() {
        let service = setup();
        service
            .create(new_customer("First", "a@x.com", "1"))
            .await
            .unwrap();

        let err = service
            .create(new_customer("Second", "a@x.com", "2"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CUSTOMERS_ERR_1402_CUSTOMER_EMAIL_ALREADY_EXISTS");
        assert_eq!(domain(err), DomainError::DuplicateEmail("a@x.com".to_string()));
        assert_eq!(count(&service).await, 1);
    }

    #[tokio::test]
    async fn phone_taken_by_another_customer_is_rejected() {
        let service = setup();
        service
            .create(new_customer("First", "a@x.com", "+49 30 1"))
            .await
            .unwrap();

        let err = service
            .create(new_customer("Second", "b@x.com", "+49 30 1"))
            .await
            .unwrap_err();
        assert_eq!(domain(err), DomainError::DuplicatePhone("+49 30 1".to_string()));
        assert_eq!(count(&service).await, 1);
    }

    #[tokio::test]
    async fn update_may_resubmit_own_email_and_phone() {
        let service = setup();
        let created = service
            .create(new_customer("Muster", "a@x.com", "1"))
            .await
            .unwrap();

        let update = UpdateCustomer {
            communications: Some(vec![communication("a@x.com", &["1", "2"])]),
            ..UpdateCustomer::default()
        };
        let updated = service
            .update(created.body.id_typed(), update, Some(created.token().to_string().as_str()))
            .await
            .unwrap();

        assert_eq!(updated.body.communications().len(), 1);
        assert_eq!(updated.body.phones().count(), 2);
    }

    #[tokio::test]
    async fn update_may_not_take_another_customers_email() {
        let service = setup();
        service
            .create(new_customer("Other", "taken@x.com", "9"))
            .await
            .unwrap();
        let created = service
            .create(new_customer("Muster", "a@x.com", "1"))
            .await
            .unwrap();

        let update = UpdateCustomer {
            communications: Some(vec![communication("taken@x.com", &[])]),
            ..UpdateCustomer::default()
        };
        let err = service
            .update(created.body.id_typed(), update, Some("\"0\""))
            .await
            .unwrap_err();
        assert_eq!(domain(err), DomainError::DuplicateEmail("taken@x.com".to_string()));

        let stored = service.get_by_id(created.body.id_typed()).await.unwrap();
        assert_eq!(stored.version, 0);
        assert_eq!(stored.body.communications()[0].email, "a@x.com");
    }

    #[tokio::test]
    async fn update_replaces_collections_and_keeps_absent_fields() {
        let service = setup();
        let created = service
            .create(new_customer("Muster", "a@x.com", "1"))
            .await
            .unwrap();
        let id = created.body.id_typed();

        let update = UpdateCustomer {
            first_name: Some("Moritz".to_string()),
            addresses: Some(vec![address("Berlin"), address("Potsdam")]),
            ..UpdateCustomer::default()
        };
        let updated = service.update(id, update, Some("\"0\"")).await.unwrap().body;

        assert_eq!(updated.name(), "Muster");
        assert_eq!(updated.first_name(), "Moritz");
        let cities: Vec<_> = updated.addresses().iter().map(|a| a.city.as_str()).collect();
        assert_eq!(cities, ["Berlin", "Potsdam"]);
        assert!(updated.addresses().iter().all(|a| a.customer_id == id));
        assert_eq!(updated.communications(), created.body.communications());
        updated.check_ownership().unwrap();
    }

    #[tokio::test]
    async fn create_bulk_is_all_or_nothing() {
        let service = setup();
        service
            .create(new_customer("Existing", "taken@x.com", "0"))
            .await
            .unwrap();

        let err = service
            .create_bulk(vec![
                new_customer("A", "a@x.com", "1"),
                new_customer("B", "taken@x.com", "2"),
            ])
            .await
            .unwrap_err();
        assert!(matches!(domain(err), DomainError::DuplicateEmail(_)));
        assert_eq!(count(&service).await, 1);

        let created = service
            .create_bulk(vec![
                new_customer("A", "a@x.com", "1"),
                new_customer("B", "b@x.com", "2"),
            ])
            .await
            .unwrap();
        let names: Vec<_> = created.iter().map(|c| c.name()).collect();
        assert_eq!(names, ["A", "B"]);
        assert!(created.iter().all(|c| c.version() == 0));
        assert_eq!(count(&service).await, 3);
    }

    #[tokio::test]
    async fn create_bulk_rejects_duplicates_between_siblings() {
        let service = setup();
        let err = service
            .create_bulk(vec![
                new_customer("A", "a@x.com", "1"),
                new_customer("B", "b@x.com", "1"),
            ])
            .await
            .unwrap_err();
        assert_eq!(domain(err), DomainError::DuplicatePhone("1".to_string()));
        assert_eq!(count(&service).await, 0);
    }

    #[tokio::test]
    async fn update_bulk_with_one_missing_id_changes_nothing() {
        let service = setup();
        let a = service
            .create(new_customer("A", "a@x.com", "1"))
            .await
            .unwrap()
            .body
            .id_typed();
        let missing = CustomerId::new();

        let rename = |customer_id, name: &str| UpdateCustomerItem {
            customer_id,
            update: UpdateCustomer {
                name: Some(name.to_string()),
                ..UpdateCustomer::default()
            },
        };
        let err = service
            .update_bulk(vec![rename(a, "A2"), rename(missing, "X")])
            .await
            .unwrap_err();

        assert_eq!(err.kind(), Some(ErrorKind::Validation));
        assert_eq!(err.code(), "CUSTOMERS_ERR_1401_CUSTOMER_NOT_FOUND");
        assert_eq!(domain(err), DomainError::UnknownCustomer(missing));

        let stored = service.get_by_id(a).await.unwrap();
        assert_eq!(stored.version, 0);
        assert_eq!(stored.body.name(), "A");
    }

    #[tokio::test]
    async fn update_bulk_advances_every_version() {
        let service = setup();
        let created = service
            .create_bulk(vec![
                new_customer("A", "a@x.com", "1"),
                new_customer("B", "b@x.com", "2"),
            ])
            .await
            .unwrap();

        let items = created
            .iter()
            .map(|c| UpdateCustomerItem {
                customer_id: c.id_typed(),
                update: UpdateCustomer {
                    communications: Some(vec![communication(
                        &format!("new-{}", c.communications()[0].email),
                        &[],
                    )]),
                    ..UpdateCustomer::default()
                },
            })
            .collect();
        let updated = service.update_bulk(items).await.unwrap();

        assert_eq!(updated.len(), 2);
        assert!(updated.iter().all(|c| c.version() == 1));
        assert_eq!(updated[0].communications()[0].email, "new-a@x.com");
        assert_eq!(updated[1].communications()[0].email, "new-b@x.com");
    }

    #[tokio::test]
    async fn update_bulk_rejects_email_claimed_by_sibling() {
        let service = setup();
        let created = service
            .create_bulk(vec![
                new_customer("A", "a@x.com", "1"),
                new_customer("B", "b@x.com", "2"),
            ])
            .await
            .unwrap();

        let items = created
            .iter()
            .map(|c| UpdateCustomerItem {
                customer_id: c.id_typed(),
                update: UpdateCustomer {
                    communications: Some(vec![communication("shared@x.com", &[])]),
                    ..UpdateCustomer::default()
                },
            })
            .collect();
        let err = service.update_bulk(items).await.unwrap_err();
        assert_eq!(domain(err), DomainError::DuplicateEmail("shared@x.com".to_string()));
    }

    #[tokio::test]
    async fn delete_bulk_with_one_missing_id_deletes_nothing() {
        let service = setup();
        let a = service
            .create(new_customer("A", "a@x.com", "1"))
            .await
            .unwrap()
            .body
            .id_typed();
        let missing = CustomerId::new();

        let err = service.delete_bulk(&[a, missing]).await.unwrap_err();
        assert_eq!(domain(err), DomainError::UnknownCustomer(missing));
        assert!(service.get_by_id(a).await.is_ok());

        service.delete_bulk(&[a]).await.unwrap();
        assert_eq!(count(&service).await, 0);
    }

    #[tokio::test]
    async fn deleted_customer_releases_email_and_phone() {
        let service = setup();
        let id = service
            .create(new_customer("A", "a@x.com", "1"))
            .await
            .unwrap()
            .body
            .id_typed();
        service.delete(id).await.unwrap();

        assert!(service.create(new_customer("B", "a@x.com", "1")).await.is_ok());
    }

    #[tokio::test]
    async fn city_filter_returns_customer_once_despite_several_matches() {
        let service = setup();
        let mut berliner = new_customer("Berliner", "b@x.com", "1");
        berliner.addresses = vec![address("Berlin"), address("Berlin"), address("Hamburg")];
        let berliner = service.create(berliner).await.unwrap().body.id_typed();
        service
            .create(new_customer("Hanseat", "h@x.com", "2"))
            .await
            .unwrap();

        let filter = CustomerFilter::new().with_city("Berlin");
        let page = service.get_filtered(&filter, &first_page(20)).await.unwrap();

        assert_eq!(page.total_elements, 1);
        assert_eq!(page.content.len(), 1);
        assert_eq!(page.content[0].id_typed(), berliner);
    }

    #[tokio::test]
    async fn empty_filter_matches_everyone() {
        let service = setup();
        for idx in 0..3 {
            service
                .create(new_customer(&format!("C{idx}"), &format!("{idx}@x.com"), &idx.to_string()))
                .await
                .unwrap();
        }

        let page = service
            .get_filtered(&CustomerFilter::new().with_name("  "), &first_page(2))
            .await
            .unwrap();
        assert_eq!(page.total_elements, 3);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.content.len(), 2);
    }

    #[tokio::test]
    async fn search_matches_id_text_or_name_and_combines_with_other_criteria() {
        let service = setup();
        let schmidt = service
            .create(new_customer("Schmidt", "s@x.com", "1"))
            .await
            .unwrap()
            .body
            .id_typed();
        service
            .create(new_customer("Schneider", "n@x.com", "2"))
            .await
            .unwrap();

        let by_id = CustomerFilter::new().with_search(schmidt.to_string());
        let by_id_page = service.get_filtered(&by_id, &first_page(20)).await.unwrap();
        assert_eq!(by_id_page.total_elements, 1);

        let by_name = CustomerFilter::new().with_search("SCH");
        let by_name_page = service.get_filtered(&by_name, &first_page(20)).await.unwrap();
        assert_eq!(by_name_page.total_elements, 2);

        let narrowed = CustomerFilter::new()
            .with_search("sch")
            .with_email("n@x.com");
        let narrowed_page = service.get_filtered(&narrowed, &first_page(20)).await.unwrap();
        assert_eq!(narrowed_page.total_elements, 1);
        assert_eq!(narrowed_page.content[0].name(), "Schneider");
    }

    #[tokio::test]
    async fn filtered_page_honours_sort() {
        let service = setup();
        for (idx, name) in ["Bauer", "Adler", "Cramer"].iter().enumerate() {
            service
                .create(new_customer(name, &format!("{idx}@x.com"), &idx.to_string()))
                .await
                .unwrap();
        }

        let request = PageRequest::new(0, 10, Sort::desc(SortField::Name)).unwrap();
        let page = service
            .get_filtered(&CustomerFilter::new(), &request)
            .await
            .unwrap();
        let names: Vec<_> = page.content.iter().map(|c| c.name()).collect();
        assert_eq!(names, ["Cramer", "Bauer", "Adler"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_updates_with_one_token_let_exactly_one_through() {
        let service = setup();
        let id = service
            .create(new_customer("Muster", "a@x.com", "1"))
            .await
            .unwrap()
            .body
            .id_typed();

        let writers: Vec<_> = (0..8)
            .map(|idx| {
                let service = service.clone();
                tokio::spawn(async move {
                    let update = UpdateCustomer {
                        name: Some(format!("Writer {idx}")),
                        ..UpdateCustomer::default()
                    };
                    service.update(id, update, Some("\"0\"")).await
                })
            })
            .collect();

        let mut successes = 0;
        for writer in writers {
            match writer.await.unwrap() {
                Ok(updated) => {
                    successes += 1;
                    assert_eq!(updated.version, 1);
                }
                Err(err) => assert_eq!(err.kind(), Some(ErrorKind::PreconditionFailed)),
            }
        }
        assert_eq!(successes, 1);

        let stored = service.get_by_id(id).await.unwrap();
        assert_eq!(stored.version, 1);
        assert!(stored.body.name().starts_with("Writer "));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_bulk_deletes_over_reversed_ids_fail_cleanly() {
        let service = setup();
        let created = service
            .create_bulk(vec![
                new_customer("A", "a@x.com", "1"),
                new_customer("B", "b@x.com", "2"),
            ])
            .await
            .unwrap();
        let (a, b) = (created[0].id_typed(), created[1].id_typed());

        let deleters: Vec<_> = [vec![a, b], vec![b, a]]
            .into_iter()
            .map(|ids| {
                let service = service.clone();
                tokio::spawn(async move { service.delete_bulk(&ids).await })
            })
            .collect();

        let mut successes = 0;
        for deleter in deleters {
            match deleter.await.unwrap() {
                Ok(()) => successes += 1,
                Err(err) => assert!(matches!(domain(err), DomainError::UnknownCustomer(_))),
            }
        }
        assert_eq!(successes, 1);
        assert_eq!(count(&service).await, 0);
    }

    #[tokio::test]
    async fn update_bulk_items_may_resubmit_their_own_email_and_phone() {
        let service = setup();
        let created = service
            .create_bulk(vec![
                new_customer("A", "a@x.com", "1"),
                new_customer("B", "b@x.com", "2"),
            ])
            .await
            .unwrap();

        let items = created
            .iter()
            .map(|c| {
                let own = &c.communications()[0];
                let phones: Vec<&str> = own.phones.iter().map(|p| p.phone_number.as_str()).collect();
                UpdateCustomerItem {
                    customer_id: c.id_typed(),
                    update: UpdateCustomer {
                        first_name: Some("Moritz".to_string()),
                        communications: Some(vec![communication(&own.email, &phones)]),
                        ..UpdateCustomer::default()
                    },
                }
            })
            .collect();
        let updated = service.update_bulk(items).await.unwrap();

        assert_eq!(updated.len(), 2);
        assert!(updated.iter().all(|c| c.version() == 1 && c.first_name() == "Moritz"));
        assert_eq!(updated[0].communications()[0].email, "a@x.com");
        assert_eq!(updated[1].phones().next().unwrap().phone_number, "2");
    }
}
