use super::IndexConfig;

impl IndexConfig {
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("FERRET_SQLITE_PATH") {
            self.storage.sqlite_path = v;
        }
        if let Ok(v) = std::env::var("FERRET_EMBEDDINGS_PROVIDER") {
            if let Ok(kind) = serde_json::from_value(serde_json::Value::String(v.clone())) {
                self.embeddings.provider = kind;
            } else {
                tracing::warn!("ignoring invalid FERRET_EMBEDDINGS_PROVIDER value: {v}");
            }
        }
        if let Ok(v) = std::env::var("FERRET_EMBEDDINGS_BASE_URL") {
            self.embeddings.base_url = v;
        }
        if let Ok(v) = std::env::var("FERRET_EMBEDDINGS_MODEL") {
            self.embeddings.model = v;
        }
        if let Ok(v) = std::env::var("FERRET_EMBEDDINGS_API_KEY") {
            self.embeddings.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("FERRET_EMBEDDINGS_BATCH_SIZE")
            && let Ok(size) = v.parse::<usize>()
        {
            self.embeddings.batch_size = size;
        }
        if let Ok(v) = std::env::var("FERRET_EMBEDDINGS_MAX_CONCURRENCY")
            && let Ok(n) = v.parse::<usize>()
        {
            self.embeddings.max_concurrency = n;
        }
        if let Ok(v) = std::env::var("FERRET_MAX_FILE_SIZE")
            && let Ok(size) = v.parse::<u64>()
        {
            self.indexer.max_file_size = size;
        }
        if let Ok(v) = std::env::var("FERRET_RETRIEVAL_N_RETRIEVE")
            && let Ok(n) = v.parse::<usize>()
        {
            self.retrieval.n_retrieve = n;
        }
        if let Ok(v) = std::env::var("FERRET_RETRIEVAL_N_FINAL")
            && let Ok(n) = v.parse::<usize>()
        {
            self.retrieval.n_final = n;
        }
    }
}
