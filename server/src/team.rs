//! Team membership, leadership and loot policy
//!
//! Teams are keyed by member id, not by connection, so a member that goes
//! offline stays on the team until they leave or are kicked. Every team is
//! non-empty, its leader is always a member and it never holds more than
//! [`MAX_TEAM_SIZE`] players.

use chat_shared::{ObjectId, ZoneId};
use log::{debug, info};
use std::collections::HashMap;
use thiserror::Error;

pub type TeamId = u64;

pub const MAX_TEAM_SIZE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TeamError {
    #[error("player is already in a team")]
    AlreadyInTeam,
    #[error("target is already in a team")]
    TargetAlreadyInTeam,
    #[error("target is not online")]
    TargetUnreachable,
    #[error("player is not in a team")]
    NotInTeam,
    #[error("only the team leader can do that")]
    NotLeader,
    #[error("target is not a member of the team")]
    TargetNotMember,
    #[error("team is full")]
    TeamFull,
    #[error("no pending team invite")]
    NoPendingInvite,
    #[error("the leader cannot kick themselves")]
    CannotKickSelf,
    #[error("unknown loot policy {0}")]
    InvalidLootPolicy(u8),
    #[error("a team needs at least one member")]
    EmptyTeam,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LootPolicy {
    FreeForAll = 0,
    #[default]
    RoundRobin = 1,
    LeaderOnly = 2,
}

impl TryFrom<u8> for LootPolicy {
    type Error = TeamError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(LootPolicy::FreeForAll),
            1 => Ok(LootPolicy::RoundRobin),
            2 => Ok(LootPolicy::LeaderOnly),
            other => Err(TeamError::InvalidLootPolicy(other)),
        }
    }
}

/// Who may invite new members into an existing team.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum InvitePolicy {
    #[default]
    LeaderOnly,
    AnyMember,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Team {
    pub id: TeamId,
    pub leader: ObjectId,
    /// Join order; the first entry is promoted when the leader leaves
    pub members: Vec<ObjectId>,
    pub loot: LootPolicy,
    pub zone: ZoneId,
    /// Created by a world server rather than by players
    pub local: bool,
}

impl Team {
    pub fn contains(&self, id: ObjectId) -> bool {
        self.members.contains(&id)
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= MAX_TEAM_SIZE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingInvite {
    pub team_id: TeamId,
    pub inviter: ObjectId,
}

/// What happened to a team when one member left it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaveOutcome {
    pub team_id: TeamId,
    pub member: ObjectId,
    pub disbanded: bool,
    pub new_leader: Option<ObjectId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedTeam {
    pub team_id: TeamId,
    /// Teams the members were pulled out of
    pub previous_teams: Vec<LeaveOutcome>,
}

#[derive(Debug)]
pub struct TeamRegistry {
    teams: HashMap<TeamId, Team>,
    membership: HashMap<ObjectId, TeamId>,
    /// Outstanding invites keyed by the invited player
    invites: HashMap<ObjectId, PendingInvite>,
    next_team_id: TeamId,
    invite_policy: InvitePolicy,
}

impl Default for TeamRegistry {
    fn default() -> Self {
        Self::new(InvitePolicy::default())
    }
}

impl TeamRegistry {
    pub fn new(invite_policy: InvitePolicy) -> Self {
        Self {
            teams: HashMap::new(),
            membership: HashMap::new(),
            invites: HashMap::new(),
            next_team_id: 1,
            invite_policy,
        }
    }

    /// Creates a team of one led by `leader`
    pub fn create(&mut self, leader: ObjectId, zone: ZoneId) -> Result<TeamId, TeamError> {
        if self.membership.contains_key(&leader) {
            return Err(TeamError::AlreadyInTeam);
        }
        Ok(self.insert_team(vec![leader], zone, false))
    }

    /// Creates a team on behalf of a world server
    ///
    /// Members are pulled out of whatever team they were in. The first member
    /// leads the new team.
    pub fn create_with_members(
        &mut self,
        members: &[ObjectId],
        zone: ZoneId,
        local: bool,
    ) -> Result<CreatedTeam, TeamError> {
        let mut unique: Vec<ObjectId> = Vec::with_capacity(members.len());
        for &member in members {
            if !unique.contains(&member) {
                unique.push(member);
            }
        }
        if unique.is_empty() {
            return Err(TeamError::EmptyTeam);
        }
        if unique.len() > MAX_TEAM_SIZE {
            return Err(TeamError::TeamFull);
        }

        let mut previous_teams = Vec::new();
        for &member in &unique {
            if self.membership.contains_key(&member) {
                previous_teams.push(self.leave(member)?);
            }
            self.invites.remove(&member);
        }

        let team_id = self.insert_team(unique, zone, local);
        Ok(CreatedTeam {
            team_id,
            previous_teams,
        })
    }

    /// Records an invite from `inviter` to `target`
    ///
    /// An inviter without a team gets a fresh team of one first. Whether the
    /// target is online is the caller's concern.
    pub fn invite(
        &mut self,
        inviter: ObjectId,
        target: ObjectId,
        zone: ZoneId,
    ) -> Result<TeamId, TeamError> {
        if inviter == target || self.membership.contains_key(&target) {
            return Err(TeamError::TargetAlreadyInTeam);
        }

        let team_id = match self.team_of(inviter) {
            Some(team) => {
                if self.invite_policy == InvitePolicy::LeaderOnly && team.leader != inviter {
                    return Err(TeamError::NotLeader);
                }
                if team.is_full() {
                    return Err(TeamError::TeamFull);
                }
                team.id
            }
            None => self.insert_team(vec![inviter], zone, false),
        };

        self.invites
            .insert(target, PendingInvite { team_id, inviter });
        debug!("Player {} invited {} to team {}", inviter, target, team_id);
        Ok(team_id)
    }

    /// Applies the invited player's answer
    ///
    /// Returns the joined team on acceptance and `None` when declined.
    pub fn invite_response(
        &mut self,
        target: ObjectId,
        accept: bool,
    ) -> Result<Option<TeamId>, TeamError> {
        let invite = self
            .invites
            .remove(&target)
            .ok_or(TeamError::NoPendingInvite)?;
        if !accept {
            return Ok(None);
        }
        if self.membership.contains_key(&target) {
            return Err(TeamError::TargetAlreadyInTeam);
        }

        let team = self
            .teams
            .get_mut(&invite.team_id)
            .ok_or(TeamError::NoPendingInvite)?;
        if team.is_full() {
            return Err(TeamError::TeamFull);
        }
        team.members.push(target);
        self.membership.insert(target, invite.team_id);
        info!("Player {} joined team {}", target, invite.team_id);
        Ok(Some(invite.team_id))
    }

    /// Removes `member` from their team
    ///
    /// A leaving leader hands over to the earliest-joined remaining member.
    /// The last member leaving disbands the team and drops its invites.
    pub fn leave(&mut self, member: ObjectId) -> Result<LeaveOutcome, TeamError> {
        let team_id = self
            .membership
            .remove(&member)
            .ok_or(TeamError::NotInTeam)?;
        let team = self.teams.get_mut(&team_id).ok_or(TeamError::NotInTeam)?;
        team.members.retain(|&id| id != member);

        let mut outcome = LeaveOutcome {
            team_id,
            member,
            disbanded: false,
            new_leader: None,
        };

        if let Some(&successor) = team.members.first() {
            if team.leader == member {
                team.leader = successor;
                outcome.new_leader = Some(successor);
            }
        } else {
            self.teams.remove(&team_id);
            self.invites.retain(|_, invite| invite.team_id != team_id);
            outcome.disbanded = true;
            info!("Team {} disbanded", team_id);
        }
        Ok(outcome)
    }

    /// Removes `target` from the requester's team
    pub fn kick(
        &mut self,
        requester: ObjectId,
        target: ObjectId,
    ) -> Result<LeaveOutcome, TeamError> {
        let team = self.team_of(requester).ok_or(TeamError::NotInTeam)?;
        if team.leader != requester {
            return Err(TeamError::NotLeader);
        }
        if requester == target {
            return Err(TeamError::CannotKickSelf);
        }
        if !team.contains(target) {
            return Err(TeamError::TargetNotMember);
        }
        self.leave(target)
    }

    /// Hands leadership to another member
    pub fn promote(
        &mut self,
        requester: ObjectId,
        new_leader: ObjectId,
    ) -> Result<TeamId, TeamError> {
        let team = self.leader_team_mut(requester)?;
        if !team.contains(new_leader) {
            return Err(TeamError::TargetNotMember);
        }
        team.leader = new_leader;
        Ok(team.id)
    }

    pub fn set_loot(
        &mut self,
        requester: ObjectId,
        policy: LootPolicy,
    ) -> Result<TeamId, TeamError> {
        let team = self.leader_team_mut(requester)?;
        team.loot = policy;
        Ok(team.id)
    }

    pub fn team_of(&self, id: ObjectId) -> Option<&Team> {
        self.membership
            .get(&id)
            .and_then(|team_id| self.teams.get(team_id))
    }

    pub fn get(&self, team_id: TeamId) -> Option<&Team> {
        self.teams.get(&team_id)
    }

    pub fn pending_invite(&self, target: ObjectId) -> Option<&PendingInvite> {
        self.invites.get(&target)
    }

    pub fn len(&self) -> usize {
        self.teams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }

    fn leader_team_mut(&mut self, requester: ObjectId) -> Result<&mut Team, TeamError> {
        let team_id = *self
            .membership
            .get(&requester)
            .ok_or(TeamError::NotInTeam)?;
        let team = self.teams.get_mut(&team_id).ok_or(TeamError::NotInTeam)?;
        if team.leader != requester {
            return Err(TeamError::NotLeader);
        }
        Ok(team)
    }

    fn insert_team(&mut self, members: Vec<ObjectId>, zone: ZoneId, local: bool) -> TeamId {
        let id = self.next_team_id;
        self.next_team_id += 1;
        for &member in &members {
            self.membership.insert(member, id);
        }
        let leader = members[0];
        info!("Team {} created by {}", id, leader);
        self.teams.insert(
            id,
            Team {
                id,
                leader,
                members,
                loot: LootPolicy::default(),
                zone,
                local,
            },
        );
        id
    }
}
