//! Diesel schema for the embedded task store.
//!
//! Timestamps are RFC 3339 UTC strings; see [`super::models`].

diesel::table! {
    /// Task records and their lifecycle timestamps.
    tasks (id) {
        /// Hyphenated UUID.
        id -> Text,
        /// Trimmed description.
        description -> Text,
        /// Lowercase lifecycle state.
        state -> Text,
        /// Creation timestamp.
        created_at -> Text,
        /// Last update timestamp.
        updated_at -> Text,
        /// Completion timestamp.
        completed_at -> Nullable<Text>,
        /// Revisit timestamp for deferred tasks.
        deferred_until -> Nullable<Text>,
        /// Cancellation timestamp.
        cancelled_at -> Nullable<Text>,
        /// Cancellation reason.
        cancel_reason -> Nullable<Text>,
        /// Deferral timestamp.
        deferred_at -> Nullable<Text>,
        /// Deferral reason.
        defer_reason -> Nullable<Text>,
    }
}

diesel::table! {
    /// Append-only audit trail.
    task_events (id) {
        /// Autoincrementing event identifier.
        id -> BigInt,
        /// Owning task.
        task_id -> Text,
        /// Uppercase event type.
        event_type -> Text,
        /// When the event happened.
        timestamp -> Text,
        /// Optional JSON object, e.g. `{"reason": "..."}`.
        metadata -> Nullable<Text>,
    }
}

diesel::joinable!(task_events -> tasks (task_id));
diesel::allow_tables_to_appear_in_same_query!(tasks, task_events);
