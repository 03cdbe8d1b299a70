use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use smartcv_core::{
    AiClientError, ChatCompleter, CompletionRequest, CompletionResponse, ConversationContext,
    Database, Intent, IntentResolver, JobListingRepository, NewJobListing, SearchFilters,
};
use tempfile::TempDir;

struct UnreachableAi;

#[async_trait]
impl ChatCompleter for UnreachableAi {
    async fn complete(&self, _request: &CompletionRequest) -> Result<CompletionResponse, AiClientError> {
        panic!("deterministic matching should resolve this turn without touching the AI fallback");
    }
}

async fn setup() -> (JobListingRepository, TempDir) {
    let dir = TempDir::new().expect("temp dir");
    let db_path = dir.path().join("db.sqlite");
    let db = Database::new(&db_path).await.expect("create db");
    smartcv_core::migrations::run_migrations(&db).await.expect("migrations");
    (JobListingRepository::new(db), dir)
}

/// Free text resolved by the intent resolver feeds straight into the
/// listing search with no translation step in between: the resolved
/// `SearchFilters` are the same `category`/`state` pair `find_matching`
/// expects.
#[tokio::test]
async fn resolved_search_intent_filters_match_real_listings() {
    let (listings, _dir) = setup().await;
    listings
        .create(NewJobListing {
            recruiter_phone: "+2348000000001".into(),
            title: "Backend Engineer".into(),
            category: "it_software".into(),
            state: "Lagos".into(),
            description: "Rust backend role".into(),
            contact_email: None,
            expires_in: ChronoDuration::days(30),
        })
        .await
        .expect("create listing");
    listings
        .create(NewJobListing {
            recruiter_phone: "+2348000000002".into(),
            title: "Site Accountant".into(),
            category: "accounting_finance".into(),
            state: "FCT".into(),
            description: "Manage site ledgers".into(),
            contact_email: None,
            expires_in: ChronoDuration::days(30),
        })
        .await
        .expect("create listing");

    let resolver = IntentResolver::new(Arc::new(UnreachableAi));
    let context = ConversationContext {
        recent_turns: vec!["I used to write software at a startup".to_string()],
    };
    let intent = resolver.resolve("engineer jobs in lagos", &context).await;

    let Intent::SearchJobs { filters: SearchFilters { category: Some(category), location: Some(location), .. } } = intent
    else {
        panic!("expected a resolved search intent with both a category and a location, got {intent:?}");
    };

    let matches = listings.find_matching(&category, &location, 10).await.expect("find matching");
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].title, "Backend Engineer");
}

/// A listing that matches the resolved category but sits in a different
/// state than the resolved location returns no matches rather than falling
/// back to listings from another state.
#[tokio::test]
async fn resolved_search_intent_with_no_listings_in_state_returns_empty() {
    let (listings, _dir) = setup().await;
    listings
        .create(NewJobListing {
            recruiter_phone: "+2348000000001".into(),
            title: "Backend Engineer".into(),
            category: "it_software".into(),
            state: "FCT".into(),
            description: "Rust backend role".into(),
            contact_email: None,
            expires_in: ChronoDuration::days(30),
        })
        .await
        .expect("create listing");

    let resolver = IntentResolver::new(Arc::new(UnreachableAi));
    let context = ConversationContext {
        recent_turns: vec!["I used to write software at a startup".to_string()],
    };
    let intent = resolver.resolve("engineer jobs in lagos", &context).await;

    let Intent::SearchJobs { filters: SearchFilters { category: Some(category), location: Some(location), .. } } = intent
    else {
        panic!("expected a resolved search intent with both a category and a location, got {intent:?}");
    };

    let matches = listings.find_matching(&category, &location, 10).await.expect("find matching");
    assert!(matches.is_empty());
}

/// A deactivated listing no longer matches a search, even though it's still
/// the most recently created row for its category/state pair.
#[tokio::test]
async fn deactivated_listing_drops_out_of_search_results() {
    let (listings, _dir) = setup().await;
    let listing = listings
        .create(NewJobListing {
            recruiter_phone: "+2348000000001".into(),
            title: "Backend Engineer".into(),
            category: "it_software".into(),
            state: "Lagos".into(),
            description: "Rust backend role".into(),
            contact_email: None,
            expires_in: ChronoDuration::days(30),
        })
        .await
        .expect("create listing");

    listings.deactivate(&listing.id).await.expect("deactivate");

    let matches = listings.find_matching("it_software", "Lagos", 10).await.expect("find matching");
    assert!(matches.is_empty());
}
