//! Phase legality checks performed before any event is constructed.
//!
//! Every command kind has exactly one row in [`PHASE_RULES`]. Rows may restrict
//! the phases in which the command is legal and may declare a target phase with
//! the source phases it can be reached from. The reducer re-validates phase
//! changes against the stored state independently.

use thiserror::Error;

use crate::state::{
    envelope::{Command, CommandName},
    phase::Phase,
};

/// Declared phase transition of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRule {
    /// Phase the command moves the session to.
    pub target: Phase,
    /// Phases the transition may start from.
    pub allowed_sources: &'static [Phase],
}

/// Phase restrictions of a single command kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseRule {
    /// Command kind this row describes.
    pub command: CommandName,
    /// Phases in which the command is legal; `None` means unrestricted.
    pub allowed_phases: Option<&'static [Phase]>,
    /// Declared transition, for phase-changing commands.
    pub transition: Option<TransitionRule>,
}

/// Phase rules of every command kind.
pub const PHASE_RULES: [PhaseRule; 10] = [
    PhaseRule {
        command: CommandName::CreateSession,
        allowed_phases: Some(&[Phase::Idle]),
        transition: None,
    },
    PhaseRule {
        command: CommandName::StartGame,
        allowed_phases: Some(&[Phase::Lobby]),
        transition: Some(TransitionRule {
            target: Phase::Start,
            allowed_sources: &[Phase::Lobby],
        }),
    },
    PhaseRule {
        command: CommandName::GiveHint,
        allowed_phases: Some(&[Phase::Start, Phase::Hint]),
        transition: None,
    },
    PhaseRule {
        command: CommandName::OpenGuessing,
        allowed_phases: Some(&[Phase::Start, Phase::Hint]),
        transition: Some(TransitionRule {
            target: Phase::Guessing,
            allowed_sources: &[Phase::Start, Phase::Hint],
        }),
    },
    PhaseRule {
        command: CommandName::SubmitAnswer,
        allowed_phases: Some(&[Phase::Guessing]),
        transition: None,
    },
    PhaseRule {
        command: CommandName::LockAnswers,
        allowed_phases: Some(&[Phase::Guessing]),
        transition: Some(TransitionRule {
            target: Phase::Lock,
            allowed_sources: &[Phase::Guessing],
        }),
    },
    PhaseRule {
        command: CommandName::RevealAnswer,
        allowed_phases: Some(&[Phase::Lock]),
        transition: Some(TransitionRule {
            target: Phase::Reveal,
            allowed_sources: &[Phase::Lock],
        }),
    },
    PhaseRule {
        command: CommandName::PlaySong,
        allowed_phases: Some(&[Phase::Reveal]),
        transition: Some(TransitionRule {
            target: Phase::Play,
            allowed_sources: &[Phase::Reveal],
        }),
    },
    PhaseRule {
        command: CommandName::EndSong,
        allowed_phases: Some(&[Phase::Play]),
        transition: Some(TransitionRule {
            target: Phase::Intermission,
            allowed_sources: &[Phase::Play],
        }),
    },
    // Target depends on the catalog (Start, Finished or none from Lobby).
    PhaseRule {
        command: CommandName::NextRound,
        allowed_phases: Some(&[Phase::Lobby, Phase::Intermission]),
        transition: None,
    },
];

/// Which of the two guard checks failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    /// The command is not legal in the current phase.
    NotAllowedInPhase,
    /// The declared transition cannot start from the current phase.
    IllegalSource,
}

/// Command attempted outside its allowed phases, or along an illegal edge.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{command} is not allowed while in {current:?} (permitted: {permitted:?})")]
pub struct PhaseViolation {
    /// Command that was rejected.
    pub command: CommandName,
    /// Phase the session was in.
    pub current: Phase,
    /// Phases that would have been accepted.
    pub permitted: &'static [Phase],
    /// Check that failed.
    pub kind: ViolationKind,
}

impl PhaseViolation {
    /// Machine-readable reason code returned to clients.
    pub const CODE: &'static str = "phase_violation";
}

/// Phase rule registered for `command`.
///
/// Rows of [`PHASE_RULES`] are laid out in [`CommandName`] declaration order.
pub fn rule_for(command: CommandName) -> &'static PhaseRule {
    &PHASE_RULES[command as usize]
}

/// Fail when the command declares allowed phases and `current` is not one of them.
pub fn ensure_allowed(current: Phase, command: &Command) -> Result<(), PhaseViolation> {
    check_allowed(current, rule_for(command.name()))
}

/// Fail when the command declares a transition that cannot start from `current`.
pub fn ensure_change_allowed(current: Phase, command: &Command) -> Result<(), PhaseViolation> {
    check_change_allowed(current, rule_for(command.name()))
}

/// Run both checks in order.
pub fn ensure_legal(current: Phase, command: &Command) -> Result<(), PhaseViolation> {
    ensure_allowed(current, command)?;
    ensure_change_allowed(current, command)
}

fn check_allowed(current: Phase, rule: &PhaseRule) -> Result<(), PhaseViolation> {
    match rule.allowed_phases {
        Some(allowed) if !allowed.contains(&current) => Err(PhaseViolation {
            command: rule.command,
            current,
            permitted: allowed,
            kind: ViolationKind::NotAllowedInPhase,
        }),
        _ => Ok(()),
    }
}

fn check_change_allowed(current: Phase, rule: &PhaseRule) -> Result<(), PhaseViolation> {
    match rule.transition {
        Some(transition) if !transition.allowed_sources.contains(&current) => {
            Err(PhaseViolation {
                command: rule.command,
                current,
                permitted: transition.allowed_sources,
                kind: ViolationKind::IllegalSource,
            })
        }
        _ => Ok(()),
    }
}
