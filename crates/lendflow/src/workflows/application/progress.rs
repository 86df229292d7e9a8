use chrono::{DateTime, Utc};

use super::domain::{ApplicationId, ReviewDecision, StepPayload, StepRecord, WorkflowStep};

/// Violations raised by the step state machine before any mutation occurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StepError {
    #[error("step {step} is outside the reviewable range")]
    InvalidStep { step: u8 },
    #[error("payload does not belong to step {step}")]
    PayloadMismatch { step: u8 },
}

/// Review progress for a single application.
///
/// The pointer (`current_step`) and the completion slots are independent
/// pieces of state: completions only advance the pointer when they land
/// in order, and the administrative override may park the pointer
/// anywhere regardless of which slots are filled.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationProgress {
    application_id: ApplicationId,
    current_step: WorkflowStep,
    steps: [StepRecord; 6],
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ApplicationProgress {
    /// Fresh progress for a newly created application. The submission
    /// step is completed immediately and carries no acting party.
    pub fn start(application_id: ApplicationId, now: DateTime<Utc>) -> Self {
        let mut steps: [StepRecord; 6] = Default::default();
        steps[WorkflowStep::Submitted.index() as usize] = StepRecord {
            completed: true,
            completed_at: Some(now),
            completed_by: None,
            notes: None,
            payload: None,
        };

        Self {
            application_id,
            current_step: WorkflowStep::Submitted,
            steps,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn application_id(&self) -> ApplicationId {
        self.application_id
    }

    pub fn current_step(&self) -> WorkflowStep {
        self.current_step
    }

    pub fn step(&self, step: WorkflowStep) -> &StepRecord {
        &self.steps[step.index() as usize]
    }

    pub fn steps(&self) -> &[StepRecord; 6] {
        &self.steps
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Marks a review step completed, stamping actor, timestamp, notes,
    /// and any step-specific payload. Completing the submission step is
    /// rejected: it is pre-set when the progress record is created.
    ///
    /// The pointer advances only when the completed step is the current
    /// one; out-of-order completions fill their slot without moving it.
    /// Returns the decision when the final-approval step records one, so
    /// the caller can drive the application status through its canonical
    /// update path.
    pub fn complete_step(
        &mut self,
        step: WorkflowStep,
        actor: uuid::Uuid,
        notes: Option<String>,
        payload: Option<StepPayload>,
        now: DateTime<Utc>,
    ) -> Result<Option<ReviewDecision>, StepError> {
        if step == WorkflowStep::Submitted {
            return Err(StepError::InvalidStep { step: 0 });
        }

        if let Some(payload) = &payload {
            if payload.step() != step {
                return Err(StepError::PayloadMismatch { step: step.index() });
            }
        }

        let slot = &mut self.steps[step.index() as usize];
        slot.completed = true;
        slot.completed_at = Some(now);
        slot.completed_by = Some(actor);
        if notes.is_some() {
            slot.notes = notes;
        }
        if payload.is_some() {
            slot.payload = payload;
        }

        let decision = match (step, &slot.payload) {
            (WorkflowStep::FinalApproval, Some(StepPayload::Decision(decision))) => Some(*decision),
            _ => None,
        };

        // The submission step is always completed at creation, so a
        // pointer resting on it is equivalent to pointing at the first
        // review step.
        let effective = if self.current_step == WorkflowStep::Submitted {
            WorkflowStep::InitialReview
        } else {
            self.current_step
        };
        if step == effective {
            if let Some(next) = step.next() {
                self.current_step = next;
            }
        }

        self.updated_at = now;
        Ok(decision)
    }

    /// Administrative override: parks the pointer on the given step
    /// without touching any completion slot.
    pub fn force_current_step(&mut self, step: WorkflowStep, now: DateTime<Utc>) {
        self.current_step = step;
        self.updated_at = now;
    }

    /// True when every step below the pointer is completed, i.e. the
    /// pointer could have been reached by in-order completions alone.
    pub fn pointer_is_consistent(&self) -> bool {
        self.steps
            .iter()
            .take(self.current_step.index() as usize)
            .all(|slot| slot.completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::application::domain::{ReviewDecision, StepPayload};
    use chrono::TimeZone;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, hour, 0, 0).unwrap()
    }

    fn progress() -> ApplicationProgress {
        ApplicationProgress::start(ApplicationId::new(), at(8))
    }

    #[test]
    fn submission_step_is_precompleted_without_actor() {
        let progress = progress();
        let slot = progress.step(WorkflowStep::Submitted);
        assert!(slot.completed);
        assert_eq!(slot.completed_at, Some(at(8)));
        assert!(slot.completed_by.is_none());
        assert_eq!(progress.current_step(), WorkflowStep::Submitted);
    }

    #[test]
    fn in_order_completion_advances_pointer() {
        let mut progress = progress();
        progress
            .complete_step(WorkflowStep::InitialReview, Uuid::new_v4(), None, None, at(9))
            .expect("step 1 completes");
        assert_eq!(progress.current_step(), WorkflowStep::DocumentVerification);

        progress
            .complete_step(
                WorkflowStep::DocumentVerification,
                Uuid::new_v4(),
                None,
                None,
                at(10),
            )
            .expect("step 2 completes");
        assert_eq!(progress.current_step(), WorkflowStep::CreditCheck);
    }

    #[test]
    fn out_of_order_completion_leaves_pointer_in_place() {
        let mut progress = progress();
        progress.force_current_step(WorkflowStep::InitialReview, at(9));

        progress
            .complete_step(WorkflowStep::CreditCheck, Uuid::new_v4(), None, None, at(10))
            .expect("step 3 completes out of order");

        assert_eq!(progress.current_step(), WorkflowStep::InitialReview);
        assert!(progress.step(WorkflowStep::CreditCheck).completed);
    }

    #[test]
    fn completing_submission_step_is_rejected() {
        let mut progress = progress();
        let result =
            progress.complete_step(WorkflowStep::Submitted, Uuid::new_v4(), None, None, at(9));
        assert_eq!(result, Err(StepError::InvalidStep { step: 0 }));
    }

    #[test]
    fn payload_must_match_step() {
        let mut progress = progress();
        let result = progress.complete_step(
            WorkflowStep::InitialReview,
            Uuid::new_v4(),
            None,
            Some(StepPayload::Decision(ReviewDecision::Approved)),
            at(9),
        );
        assert_eq!(result, Err(StepError::PayloadMismatch { step: 1 }));
        assert!(!progress.step(WorkflowStep::InitialReview).completed);
    }

    #[test]
    fn recompletion_overwrites_notes_without_regressing_pointer() {
        let mut progress = progress();

        progress
            .complete_step(
                WorkflowStep::InitialReview,
                Uuid::new_v4(),
                Some("first pass".to_string()),
                None,
                at(10),
            )
            .expect("first completion");
        assert_eq!(progress.current_step(), WorkflowStep::DocumentVerification);

        progress
            .complete_step(
                WorkflowStep::InitialReview,
                Uuid::new_v4(),
                Some("second pass".to_string()),
                None,
                at(11),
            )
            .expect("second completion");

        let slot = progress.step(WorkflowStep::InitialReview);
        assert_eq!(slot.notes.as_deref(), Some("second pass"));
        assert_eq!(slot.completed_at, Some(at(11)));
        assert_eq!(progress.current_step(), WorkflowStep::DocumentVerification);
    }

    #[test]
    fn final_approval_surfaces_recorded_decision() {
        let mut progress = progress();
        let decision = progress
            .complete_step(
                WorkflowStep::FinalApproval,
                Uuid::new_v4(),
                None,
                Some(StepPayload::Decision(ReviewDecision::Rejected)),
                at(9),
            )
            .expect("step 4 completes");
        assert_eq!(decision, Some(ReviewDecision::Rejected));
    }

    #[test]
    fn document_payload_is_stored_on_its_slot() {
        let mut progress = progress();
        let mut verified = BTreeMap::new();
        verified.insert("passport".to_string(), true);
        verified.insert("payslip".to_string(), false);

        progress
            .complete_step(
                WorkflowStep::DocumentVerification,
                Uuid::new_v4(),
                None,
                Some(StepPayload::DocumentVerification(verified.clone())),
                at(9),
            )
            .expect("step 2 completes");

        match &progress.step(WorkflowStep::DocumentVerification).payload {
            Some(StepPayload::DocumentVerification(stored)) => assert_eq!(stored, &verified),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn forced_pointer_ignores_completion_flags() {
        let mut progress = progress();
        progress.force_current_step(WorkflowStep::DocumentVerification, at(9));

        assert_eq!(progress.current_step(), WorkflowStep::DocumentVerification);
        assert!(!progress.step(WorkflowStep::InitialReview).completed);
        assert!(!progress.pointer_is_consistent());
    }
}
