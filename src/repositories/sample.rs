use std::str::FromStr;

use bigdecimal::BigDecimal;

use super::{Storage, StorageError};
use crate::models::clients::{ClientListParams, ClientStatus, NewClient};
use crate::models::query::Pagination;
use crate::models::visits::{normalize_visit_date, NewVisit};

struct SampleClient {
    first_name: &'static str,
    last_name: &'static str,
    phone: &'static str,
    email: &'static str,
    address: &'static str,
    city: &'static str,
    zip: &'static str,
    notes: &'static str,
    status: ClientStatus,
    visits: &'static [SampleVisit],
}

struct SampleVisit {
    date: &'static str,
    service: &'static str,
    formula: &'static str,
    price: &'static str,
    notes: &'static str,
}

const SAMPLE_CLIENTS: &[SampleClient] = &[
    SampleClient {
        first_name: "Sarah",
        last_name: "Johnson",
        phone: "555-123-4567",
        email: "sarah.j@example.com",
        address: "123 Main Street",
        city: "Springfield",
        zip: "12345",
        notes: "Regular client, prefers appointments on Tuesdays",
        status: ClientStatus::Active,
        visits: &[
            SampleVisit {
                date: "2023-01-15",
                service: "Haircut and Color",
                formula: "Blonde 20vol + 7N",
                price: "150.00",
                notes: "Full foil highlights",
            },
            SampleVisit {
                date: "2023-02-20",
                service: "Root Touch-up",
                formula: "8N + 10vol",
                price: "85.00",
                notes: "Root coverage only",
            },
            SampleVisit {
                date: "2023-04-10",
                service: "Balayage",
                formula: "Clay lightener + toner",
                price: "200.00",
                notes: "Natural beachy look",
            },
        ],
    },
    SampleClient {
        first_name: "Michael",
        last_name: "Williams",
        phone: "555-234-5678",
        email: "mwilliams@example.com",
        address: "456 Oak Avenue",
        city: "Riverdale",
        zip: "23456",
        notes: "Allergic to certain products, check notes before appointment",
        status: ClientStatus::Active,
        visits: &[
            SampleVisit {
                date: "2023-03-10",
                service: "Men's Cut",
                formula: "N/A",
                price: "40.00",
                notes: "Fade with scissor work on top",
            },
            SampleVisit {
                date: "2023-05-15",
                service: "Men's Cut and Beard Trim",
                formula: "N/A",
                price: "55.00",
                notes: "Used hypoallergenic products",
            },
        ],
    },
    SampleClient {
        first_name: "Jessica",
        last_name: "Brown",
        phone: "555-345-6789",
        email: "jess.brown@example.com",
        address: "789 Pine Road",
        city: "Maplewood",
        zip: "34567",
        notes: "Referred by Sarah Johnson",
        status: ClientStatus::Active,
        visits: &[SampleVisit {
            date: "2023-04-01",
            service: "Special Occasion Style",
            formula: "Pravana color remover + 6N",
            price: "130.00",
            notes: "Styling for wedding attendance",
        }],
    },
    SampleClient {
        first_name: "David",
        last_name: "Miller",
        phone: "555-456-7890",
        email: "dmiller@example.com",
        address: "101 Cedar Lane",
        city: "Oakville",
        zip: "45678",
        notes: "First visit scheduled for next week",
        status: ClientStatus::New,
        visits: &[],
    },
    SampleClient {
        first_name: "Emily",
        last_name: "Davis",
        phone: "555-567-8901",
        email: "emily.d@example.com",
        address: "202 Elm Street",
        city: "Brookside",
        zip: "56789",
        notes: "Prefers morning appointments",
        status: ClientStatus::Inactive,
        visits: &[SampleVisit {
            date: "2022-11-20",
            service: "Color Correction",
            formula: "Premium Package",
            price: "120.00",
            notes: "Last visit before becoming inactive",
        }],
    },
];

/// Fills an empty store with a few demo clients and visits. Does nothing
/// when any client already exists. Returns the number of clients written.
pub async fn seed_sample_data(storage: &dyn Storage) -> Result<usize, StorageError> {
    let probe = ClientListParams {
        pagination: Some(Pagination { page: 1, limit: 1 }),
        ..Default::default()
    };
    if storage.list_clients(&probe).await?.total > 0 {
        return Ok(0);
    }

    for sample in SAMPLE_CLIENTS {
        let client = storage
            .create_client(NewClient {
                first_name: sample.first_name.to_string(),
                last_name: sample.last_name.to_string(),
                phone: sample.phone.to_string(),
                email: Some(sample.email.to_string()),
                address: Some(sample.address.to_string()),
                city: Some(sample.city.to_string()),
                zip: Some(sample.zip.to_string()),
                notes: Some(sample.notes.to_string()),
                status: Some(sample.status),
                photo_url: None,
            })
            .await?;

        for visit in sample.visits {
            let (Ok(date), Ok(price)) = (
                normalize_visit_date(visit.date),
                BigDecimal::from_str(visit.price),
            ) else {
                log::warn!("Skipping malformed sample visit dated {}", visit.date);
                continue;
            };

            storage
                .create_visit(NewVisit {
                    client_id: client.id,
                    date,
                    service: Some(visit.service.to_string()),
                    formula: Some(visit.formula.to_string()),
                    price: Some(price),
                    notes: Some(visit.notes.to_string()),
                })
                .await?;
        }
    }

    Ok(SAMPLE_CLIENTS.len())
}
