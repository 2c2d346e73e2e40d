use std::sync::Arc;

use log::warn;
use mongodb::{bson::DateTime as BsonDateTime, Client as MongoClient, Database};

use crate::biometric::{
    enrollment_key, BiometricGate, ExactMatchGate, MemoryObjectStore, ObjectStore,
    RekognitionGate, S3ObjectStore, ENROLLMENT_CONTENT_TYPE,
};
use crate::config::{AwsClients, Config};
use crate::error::{Error, Result};
use crate::events::EventBus;
use crate::guard::{MemoryGuard, MongoGuard, VoteGuard};
use crate::ledger::{BallotContract, LedgerCandidate, LedgerStore, MemoryLedger, MongoLedger};
use crate::model::{
    candidate::Candidate,
    password::hash_password,
    voter::{decode_image, generate_voter_id, national_id_hmac, RegisteredVoter, Voter, VoterRegistration},
};
use crate::registry::{MemoryRegistry, MongoRegistry, Registry};
use crate::results::{Finalizer, MemoryResultStore, MongoResultStore, ResultStore};

/// Everything a request handler needs, shared through managed state.
#[derive(Clone)]
pub struct Backend {
    pub contract: Arc<BallotContract>,
    pub guard: Arc<dyn VoteGuard>,
    pub registry: Arc<dyn Registry>,
    pub finalizer: Arc<Finalizer>,
    pub images: Arc<dyn ObjectStore>,
    pub gate: Arc<dyn BiometricGate>,
    pub events: Arc<EventBus>,
    hmac_secret: Arc<[u8]>,
}

impl Backend {
    /// Wire the components together. The biometric gate defaults to exact
    /// matching against `images`.
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        guard: Arc<dyn VoteGuard>,
        registry: Arc<dyn Registry>,
        results: Arc<dyn ResultStore>,
        images: Arc<dyn ObjectStore>,
        config: &Config,
    ) -> Self {
        let events = Arc::new(EventBus::new(config.event_capacity()));
        let contract = Arc::new(BallotContract::new(
            ledger,
            events.clone(),
            config.ledger_max_retries(),
        ));
        let finalizer = Arc::new(Finalizer::new(contract.clone(), registry.clone(), results));
        Self {
            contract,
            guard,
            registry,
            finalizer,
            gate: Arc::new(ExactMatchGate::new(images.clone())),
            images,
            events,
            hmac_secret: Arc::from(config.hmac_secret()),
        }
    }

    /// A backend that keeps everything in process memory.
    pub fn in_memory(config: &Config) -> Self {
        Self::new(
            Arc::new(MemoryLedger::new()),
            Arc::new(MemoryGuard::new()),
            Arc::new(MemoryRegistry::new()),
            Arc::new(MemoryResultStore::new()),
            Arc::new(MemoryObjectStore::new()),
            config,
        )
    }

    /// A backend that keeps everything in MongoDB, apart from images.
    pub fn with_mongodb(client: MongoClient, db: &Database, config: &Config) -> Self {
        Self::new(
            Arc::new(MongoLedger::new(client, db)),
            Arc::new(MongoGuard::new(db)),
            Arc::new(MongoRegistry::new(db)),
            Arc::new(MongoResultStore::new(db)),
            Arc::new(MemoryObjectStore::new()),
            config,
        )
    }

    /// Store images in S3 and compare faces with Rekognition.
    pub fn with_rekognition(self, aws: AwsClients, config: &Config) -> Self {
        let images: Arc<dyn ObjectStore> = Arc::new(S3ObjectStore::new(aws.s3, aws.bucket));
        let gate = Arc::new(RekognitionGate::new(
            aws.rekognition,
            images.clone(),
            config.face_similarity(),
        ));
        self.with_biometrics(images, gate)
    }

    /// Replace the image store and gate.
    pub fn with_biometrics(
        mut self,
        images: Arc<dyn ObjectStore>,
        gate: Arc<dyn BiometricGate>,
    ) -> Self {
        self.images = images;
        self.gate = gate;
        self
    }

    /// Keyed hash of a national id under this deployment's secret.
    pub fn national_id_hmac(&self, national_id: &str) -> Result<String> {
        national_id_hmac(national_id, &self.hmac_secret)
    }

    /// Add a candidate to the ledger and the roster.
    ///
    /// The ledger is the record of truth: a candidate that is already on the
    /// ledger is rejected, while one that is only missing from the roster is
    /// added to it.
    pub async fn register_candidate(&self, candidate: Candidate) -> Result<LedgerCandidate> {
        let candidate = candidate.normalized()?;
        let registered = self
            .contract
            .register_candidate(
                &candidate.candidate_id,
                &candidate.name,
                candidate.party.as_deref(),
            )
            .await?;

        let candidate_id = candidate.candidate_id.clone();
        match self.registry.insert_candidate(candidate).await {
            Ok(()) => {}
            Err(Error::AlreadyExists(_)) => {
                warn!("Candidate {candidate_id} was already on the roster")
            }
            Err(e) => return Err(e),
        }
        Ok(registered)
    }

    /// Enroll a new voter: ledger record, enrollment image and profile.
    pub async fn register_voter(
        &self,
        registration: VoterRegistration,
        registered_by: &str,
    ) -> Result<RegisteredVoter> {
        let full_name = registration.full_name.trim().to_string();
        if full_name.is_empty() {
            return Err(Error::Validation("fullName is required".to_string()));
        }
        if registration.national_id.trim().is_empty() {
            return Err(Error::Validation("nationalId is required".to_string()));
        }
        let image = decode_image("image", &registration.image)?;
        let password_hash = hash_password(&registration.password)?;

        let national_id_hmac = self.national_id_hmac(&registration.national_id)?;
        if self
            .registry
            .find_voter_by_national_id(&national_id_hmac)
            .await?
            .is_some()
        {
            return Err(Error::AlreadyExists("National id".to_string()));
        }

        let voter_id = self.unused_voter_id().await?;
        // Ledger first: a ledger voter without a profile is unreachable and
        // harmless, a profile without a ledger voter could never vote.
        self.contract.register_voter(&voter_id).await?;

        let enrollment_key = enrollment_key(&voter_id);
        let content_type = registration
            .content_type
            .as_deref()
            .unwrap_or(ENROLLMENT_CONTENT_TYPE);
        self.images.store(&enrollment_key, image, content_type).await?;

        self.registry
            .insert_voter(Voter {
                voter_id: voter_id.clone(),
                full_name: full_name.clone(),
                national_id_hmac,
                password_hash,
                enrollment_key: enrollment_key.clone(),
                face_verified: false,
                last_verified_at: None,
                registered_by: registered_by.to_string(),
                registered_at: BsonDateTime::now(),
            })
            .await?;

        Ok(RegisteredVoter {
            voter_id,
            full_name,
            enrollment_key,
        })
    }

    async fn unused_voter_id(&self) -> Result<String> {
        // Collisions between 80-bit ids are not expected; this only guards
        // against a broken random source.
        for _ in 0..8 {
            let voter_id = generate_voter_id();
            if self.registry.find_voter(&voter_id).await?.is_none() {
                return Ok(voter_id);
            }
        }
        Err(Error::Internal("Could not allocate a voter id".to_string()))
    }
}
