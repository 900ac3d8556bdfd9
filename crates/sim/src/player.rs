//! Player character component and its fixed-step logic.

use crate::component::ComponentTable;
use crate::entity::{EntityManager, EntityMask};
use crate::input::PlayerInput;
use crate::math::Vec2;
use crate::physics::PhysicsManager;
use crate::{
    BULLET_SPEED, Entity, INVALID_PLAYER, PLAYER_ACCELERATION, PLAYER_ANGULAR_SPEED,
    PLAYER_HEALTH, PLAYER_SHOOTING_PERIOD, PlayerNumber,
};

/// Distance ahead of the ship centre at which bullets appear.
const BULLET_SPAWN_OFFSET: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerCharacter {
    pub player_number: PlayerNumber,
    pub input: PlayerInput,
    /// Seconds since the last shot, saturating at the shooting period.
    pub shooting_time: f32,
    pub invincibility_time: f32,
    pub health: u8,
}

impl Default for PlayerCharacter {
    fn default() -> Self {
        Self {
            player_number: INVALID_PLAYER,
            input: PlayerInput::empty(),
            shooting_time: 0.0,
            invincibility_time: 0.0,
            health: PLAYER_HEALTH,
        }
    }
}

impl PlayerCharacter {
    pub fn new(player_number: PlayerNumber) -> Self {
        Self {
            player_number,
            ..Self::default()
        }
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0
    }
}

/// A shot fired during a player update, to be turned into a bullet entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BulletSpawn {
    pub player_number: PlayerNumber,
    pub position: Vec2,
    pub velocity: Vec2,
}

#[derive(Debug, Default, PartialEq)]
pub struct PlayerCharacterManager {
    characters: ComponentTable<PlayerCharacter>,
}

impl Clone for PlayerCharacterManager {
    fn clone(&self) -> Self {
        Self {
            characters: self.characters.clone(),
        }
    }

    fn clone_from(&mut self, source: &Self) {
        self.characters.clone_from(&source.characters);
    }
}

impl PlayerCharacterManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply each live player's current input to its body and timers.
    ///
    /// Returns the shots fired this step in ascending entity order.
    pub fn fixed_update(
        &mut self,
        entities: &EntityManager,
        physics: &mut PhysicsManager,
        dt: f32,
    ) -> Vec<BulletSpawn> {
        let mut spawns = Vec::new();
        for entity in entities.entities_with(EntityMask::PLAYER_CHARACTER) {
            if !entities.is_live(entity) {
                continue;
            }
            let (Some(character), Some(body)) =
                (self.characters.get_mut(entity), physics.body_mut(entity))
            else {
                continue;
            };
            let input = character.input;

            body.angular_velocity = input.turn_axis() * PLAYER_ANGULAR_SPEED;

            let dir = Vec2::UP.rotate(-body.rotation);
            let acceleration = dir * (input.thrust_axis() * PLAYER_ACCELERATION);
            body.velocity += acceleration * dt;

            if character.invincibility_time > 0.0 {
                character.invincibility_time -= dt;
            }
            if character.shooting_time < PLAYER_SHOOTING_PERIOD {
                character.shooting_time += dt;
            }

            if character.shooting_time >= PLAYER_SHOOTING_PERIOD
                && input.contains(PlayerInput::SHOOT)
            {
                let forward_speed = if body.velocity.dot(dir) > 0.0 {
                    body.velocity.magnitude()
                } else {
                    0.0
                };
                spawns.push(BulletSpawn {
                    player_number: character.player_number,
                    position: body.position + dir * BULLET_SPAWN_OFFSET,
                    velocity: dir * (forward_speed + BULLET_SPEED),
                });
                character.shooting_time = 0.0;
            }
        }
        spawns
    }

    pub fn insert(&mut self, entity: Entity, character: PlayerCharacter) {
        self.characters.insert(entity, character);
    }

    pub fn get(&self, entity: Entity) -> Option<&PlayerCharacter> {
        self.characters.get(entity)
    }

    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut PlayerCharacter> {
        self.characters.get_mut(entity)
    }

    pub fn remove(&mut self, entity: Entity) {
        self.characters.remove(entity);
    }

    pub fn iter(&self) -> impl Iterator<Item = (Entity, &PlayerCharacter)> {
        self.characters.iter()
    }
}
