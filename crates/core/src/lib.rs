pub mod audio {
    pub mod domain {
        pub mod audio_converter;
        pub mod audio_segment;
        pub mod speech_recognizer;
    }
    pub mod infrastructure;
}

pub mod job {
    pub mod domain {
        pub mod job_event;
        pub mod job_state;
        pub mod outcome;
    }
    pub mod job_notifier;
    pub mod job_orchestrator;
    pub mod progress_relay;
    pub mod transcript_cleaner;
}

pub mod resolver {
    pub mod domain {
        pub mod metadata_store;
        pub mod resource_reference;
    }
    pub mod infrastructure;
    pub mod resource_resolver;
}

pub mod runtime {
    pub mod native_runtime;
}

pub mod shared {
    pub mod constants;
    pub mod model_resolver;
    pub mod settings;
}
