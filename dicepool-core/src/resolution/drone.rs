//! Drone infiltration: what a drone rolls to stay unnoticed.

use super::data::{ActionData, TestKind};
use crate::document::Document;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DroneError {
    #[error("Drone infiltration needs both an item and an actor")]
    MissingDocuments,

    #[error("{0} is not a vehicle")]
    NotAVehicle(String),
}

/// Derive the infiltration action from the acting vehicle.
///
/// On autopilot the drone rolls Pilot + Sneaking [Sensor]; otherwise its
/// rigger rolls the vehicle's Perception skill.
pub fn infiltration_action(
    item: Option<&Document>,
    actor: Option<&Document>,
) -> Result<ActionData, DroneError> {
    let (Some(_item), Some(actor)) = (item, actor) else {
        return Err(DroneError::MissingDocuments);
    };
    if !actor.is_type("vehicle") {
        return Err(DroneError::NotAVehicle(actor.name.clone()));
    }

    let action = match actor.system_str("controlMode") {
        Some("autopilot") => ActionData {
            limit: Some("sensor".to_string()),
            ..ActionData::default().with_skill("pilot", "sneaking")
        },
        _ => skill_action(actor, "perception"),
    };
    Ok(action.with_test(TestKind::DroneInfiltration))
}

/// The action for rolling one of the actor's skills with its linked attribute and limit.
fn skill_action(actor: &Document, skill: &str) -> ActionData {
    let attribute = actor
        .system_str(&format!("skills.active.{skill}.attribute"))
        .unwrap_or("intuition");
    let limit = actor
        .system_str(&format!("skills.active.{skill}.limit"))
        .map(str::to_string);
    ActionData {
        limit,
        ..ActionData::default().with_skill(attribute, skill)
    }
}
