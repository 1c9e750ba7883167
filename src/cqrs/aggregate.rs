use uuid::Uuid;

// ============================================================================
// Aggregate Root
// ============================================================================
//
// Aggregates are state-stored: the current row is loaded, a command is
// validated against it and yields events, the events are applied in memory,
// and the repository persists the resulting state. An empty event list
// means the command was already satisfied.
//
// ============================================================================

pub trait Aggregate: Sized + Send + Sync {
    type Event;
    type Command;
    type Error;

    fn aggregate_id(&self) -> Uuid;

    /// Validate a command against current state and describe its effect.
    fn handle_command(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;

    /// Mutate state. Must not fail: validation belongs in `handle_command`.
    fn apply_event(&mut self, event: &Self::Event);

    /// Handle and apply in one step, returning the events for side effects.
    fn execute(&mut self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        let events = self.handle_command(command)?;
        for event in &events {
            self.apply_event(event);
        }
        Ok(events)
    }
}
