//! Queue matchmaking and private room codes on top of the room store and the room bus.

use std::{io, sync::Arc, time::SystemTime};

use rand::Rng;
use tokio::{
    sync::{broadcast, oneshot},
    time::{Instant, sleep_until},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::{room_store::RoomStore, storage::StorageError},
    dto::{validation::validate_room_code, ws::RoomMessage},
    engine::{GameId, PlayerNumber},
    error::SyncError,
    state::{
        PendingSearch, RoomHub, SearchRegistry,
        room::{QueueClass, Room, RoomStatus, Visibility},
    },
};

/// Compare-and-swap attempts spent on a single seat or leave before giving up.
const MAX_SEAT_ATTEMPTS: usize = 8;
/// Fresh codes drawn before private room creation fails.
const MAX_CODE_ATTEMPTS: usize = 32;
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Supplier of private room codes.
pub trait CodeSource: Send + Sync {
    /// Draw a candidate code of `length` characters.
    fn next_code(&self, length: usize) -> String;
}

/// Uniformly random uppercase alphanumeric codes.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomCodes;

impl CodeSource for RandomCodes {
    fn next_code(&self, length: usize) -> String {
        let mut rng = rand::rng();
        (0..length)
            .map(|_| char::from(CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())]))
            .collect()
    }
}

/// Seat obtained through matchmaking or a room code.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchTicket {
    /// Room as stored right after seating (full for queue matches).
    pub room: Room,
    /// Seat assigned to the caller.
    pub player: PlayerNumber,
}

/// Pairs users into rooms.
#[derive(Clone)]
pub struct Matchmaker {
    store: Arc<dyn RoomStore>,
    hub: Arc<RoomHub>,
    config: Arc<AppConfig>,
    searches: Arc<SearchRegistry>,
    codes: Arc<dyn CodeSource>,
}

impl Matchmaker {
    /// Matchmaker drawing random room codes.
    pub fn new(
        store: Arc<dyn RoomStore>,
        hub: Arc<RoomHub>,
        config: Arc<AppConfig>,
        searches: Arc<SearchRegistry>,
    ) -> Self {
        Self {
            store,
            hub,
            config,
            searches,
            codes: Arc::new(RandomCodes),
        }
    }

    /// Replace the room code supplier.
    pub fn with_codes(mut self, codes: Arc<dyn CodeSource>) -> Self {
        self.codes = codes;
        self
    }

    /// Backing room store.
    pub fn store(&self) -> &Arc<dyn RoomStore> {
        &self.store
    }

    /// Room bus.
    pub fn hub(&self) -> &Arc<RoomHub> {
        &self.hub
    }

    /// Runtime configuration.
    pub fn config(&self) -> &Arc<AppConfig> {
        &self.config
    }

    /// Queue `user` for `game` and wait until the room they are seated in is full.
    ///
    /// The oldest open room of the queue is filled first. A second search by the same user
    /// cancels the first one.
    pub async fn find_match(
        &self,
        game: GameId,
        queue: QueueClass,
        user: &str,
    ) -> Result<MatchTicket, SyncError> {
        let id = Uuid::new_v4();
        let (cancel, cancelled) = oneshot::channel();
        if let Some(previous) = self
            .searches
            .insert(user.to_owned(), PendingSearch { id, cancel })
        {
            debug!(user, "superseding previous search");
            let _ = previous.cancel.send(());
        }

        let outcome = self.search(game, queue, user, cancelled).await;
        self.searches.remove_if(user, |_, pending| pending.id == id);
        outcome
    }

    /// Cancel the pending search of `user`. Returns whether a search was running.
    pub fn cancel_search(&self, user: &str) -> bool {
        self.searches
            .remove(user)
            .is_some_and(|(_, pending)| pending.cancel.send(()).is_ok())
    }

    async fn search(
        &self,
        game: GameId,
        queue: QueueClass,
        user: &str,
        mut cancelled: oneshot::Receiver<()>,
    ) -> Result<MatchTicket, SyncError> {
        let deadline = Instant::now() + self.config.search_timeout;
        let (mut room, player, mut messages) = self.seat_in_queue(game, queue, user).await?;

        loop {
            if room.is_full() {
                info!(room_id = %room.id, user, player, "match found");
                return Ok(MatchTicket { room, player });
            }

            tokio::select! {
                _ = &mut cancelled => {
                    self.withdraw(room.id, user, false).await;
                    info!(room_id = %room.id, user, "search cancelled");
                    return Err(SyncError::SearchCancelled);
                }
                _ = sleep_until(deadline) => {
                    if let Some(full) = self.withdraw(room.id, user, true).await {
                        return Ok(MatchTicket { room: full, player });
                    }
                    info!(room_id = %room.id, user, "search timed out");
                    return Err(SyncError::SearchTimeout);
                }
                received = messages.recv() => {
                    if let Err(broadcast::error::RecvError::Closed) = received {
                        messages = self.hub.subscribe(room.id);
                    }
                    room = self.store.get(room.id).await?.ok_or(SyncError::RoomNotFound)?;
                }
            }
        }
    }

    /// Take the next free seat of the oldest open room of the queue, or open a new room.
    async fn seat_in_queue(
        &self,
        game: GameId,
        queue: QueueClass,
        user: &str,
    ) -> Result<(Room, PlayerNumber, broadcast::Receiver<RoomMessage>), SyncError> {
        let visibility = Visibility::Public { queue };

        for _ in 0..MAX_SEAT_ATTEMPTS {
            let candidate = self
                .store
                .list_open_by_game(game)
                .await?
                .into_iter()
                .find(|room| {
                    room.visibility == visibility
                        && (room.is_open() || room.participant(user).is_some())
                });
            let Some(room) = candidate else {
                break;
            };

            let messages = self.hub.subscribe(room.id);
            match self.seat(room, user).await {
                Ok(Some((room, player))) => return Ok((room, player, messages)),
                Ok(None) => continue,
                Err(err) => return Err(err),
            }
        }

        let room = Room::new(game, visibility, None, user, SystemTime::now());
        let messages = self.hub.subscribe(room.id);
        self.store.create(room.clone()).await?;
        info!(room_id = %room.id, game = %game, user, "opened queue room");
        Ok((room, 1, messages))
    }

    /// Seat `user` with a compare-and-swap write. `Ok(None)` means the room moved on.
    async fn seat(
        &self,
        mut room: Room,
        user: &str,
    ) -> Result<Option<(Room, PlayerNumber)>, SyncError> {
        let now = SystemTime::now();
        let player = room.add_participant(user, now)?;
        room.updated_at = now;

        match self.store.update(room.clone()).await {
            Ok(version) => {
                room.version = version;
                if let Some(participant) = room.participant_at(player).cloned() {
                    self.hub
                        .publish(room.id, RoomMessage::PlayerJoin { participant });
                }
                info!(room_id = %room.id, user, player, "seated");
                Ok(Some((room, player)))
            }
            Err(err) if err.is_conflict() => {
                debug!(room_id = %room.id, user, "lost seat race; retrying");
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Remove `user` from a waiting room after a cancel or timeout.
    ///
    /// On timeout a room that filled up in the meantime is returned instead, completing the match.
    async fn withdraw(&self, id: Uuid, user: &str, timed_out: bool) -> Option<Room> {
        for _ in 0..MAX_SEAT_ATTEMPTS {
            let mut room = match self.store.get(id).await {
                Ok(Some(room)) => room,
                Ok(None) => return None,
                Err(err) => {
                    warn!(room_id = %id, error = %err, "failed to load room while withdrawing");
                    return None;
                }
            };
            if timed_out && room.is_full() {
                return Some(room);
            }

            let player = room.remove_participant(user)?;
            if room.participants.is_empty()
                && let Err(err) = room.advance(RoomStatus::Abandoned)
            {
                debug!(room_id = %id, error = %err, "room already closed");
            }
            room.updated_at = SystemTime::now();

            match self.store.update(room).await {
                Ok(_) => {
                    self.hub.publish(id, RoomMessage::PlayerLeave { player });
                    return None;
                }
                Err(err) if err.is_conflict() => continue,
                Err(err) => {
                    warn!(room_id = %id, error = %err, "failed to withdraw from room");
                    return None;
                }
            }
        }
        None
    }

    /// Open a private room for `user` under a fresh code.
    pub async fn create_private_room(&self, game: GameId, user: &str) -> Result<Room, SyncError> {
        for _ in 0..MAX_CODE_ATTEMPTS {
            let code = self.codes.next_code(self.config.code_length);
            if self.store.find_by_code(code.clone()).await?.is_some() {
                debug!(code, "room code collision");
                continue;
            }

            let room = Room::new(game, Visibility::Private, Some(code), user, SystemTime::now());
            self.store.create(room.clone()).await?;
            info!(room_id = %room.id, game = %game, user, "opened private room");
            return Ok(room);
        }

        Err(StorageError::unavailable(
            "no free room code".to_owned(),
            io::Error::other(format!("{MAX_CODE_ATTEMPTS} codes collided")),
        )
        .into())
    }

    /// Take a seat in the open room behind `code`.
    pub async fn join_by_code(&self, code: &str, user: &str) -> Result<MatchTicket, SyncError> {
        let code = code.trim().to_ascii_uppercase();
        validate_room_code(&code).map_err(|_| SyncError::InvalidCode(code.clone()))?;

        for _ in 0..MAX_SEAT_ATTEMPTS {
            let room = self
                .store
                .find_by_code(code.clone())
                .await?
                .ok_or(SyncError::RoomNotFound)?;
            if let Some((room, player)) = self.seat(room, user).await? {
                return Ok(MatchTicket { room, player });
            }
        }

        Err(SyncError::Storage(StorageError::unavailable(
            format!("room `{code}` kept changing"),
            io::Error::other("seat attempts exhausted"),
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::dao::room_store::memory::MemoryRoomStore;

    struct FixedCodes(Vec<&'static str>, std::sync::Mutex<usize>);

    impl CodeSource for FixedCodes {
        fn next_code(&self, _length: usize) -> String {
            let mut next = self.1.lock().unwrap();
            let code = self.0[*next % self.0.len()];
            *next += 1;
            code.to_owned()
        }
    }

    fn matchmaker(search_timeout: Duration) -> Matchmaker {
        let config = AppConfig {
            search_timeout,
            ..AppConfig::default()
        };
        Matchmaker::new(
            Arc::new(MemoryRoomStore::new()),
            Arc::new(RoomHub::new(16)),
            Arc::new(config),
            Arc::new(SearchRegistry::new()),
        )
    }

    #[test]
    fn random_codes_use_the_room_code_alphabet() {
        let code = RandomCodes.next_code(6);
        assert_eq!(code.len(), 6);
        assert!(validate_room_code(&code).is_ok());
    }

    #[tokio::test]
    async fn two_searches_pair_up() {
        let matchmaker = matchmaker(Duration::from_secs(5));
        let first = {
            let matchmaker = matchmaker.clone();
            tokio::spawn(async move {
                matchmaker
                    .find_match(GameId::ConnectFive, QueueClass::Casual, "alice")
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = matchmaker
            .find_match(GameId::ConnectFive, QueueClass::Casual, "bob")
            .await
            .unwrap();
        let first = first.await.unwrap().unwrap();

        assert_eq!(first.room.id, second.room.id);
        assert_eq!((first.player, second.player), (1, 2));
        assert!(second.room.is_full());
    }

    #[tokio::test]
    async fn queues_do_not_mix() {
        let matchmaker = matchmaker(Duration::from_millis(100));
        let ranked = {
            let matchmaker = matchmaker.clone();
            tokio::spawn(async move {
                matchmaker
                    .find_match(GameId::Poker, QueueClass::Ranked, "alice")
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let casual = matchmaker
            .find_match(GameId::Poker, QueueClass::Casual, "bob")
            .await;
        assert!(matches!(casual, Err(SyncError::SearchTimeout)));
        assert!(matches!(
            ranked.await.unwrap(),
            Err(SyncError::SearchTimeout)
        ));
    }

    #[tokio::test]
    async fn timed_out_search_abandons_its_room() {
        let matchmaker = matchmaker(Duration::from_millis(30));
        let err = matchmaker
            .find_match(GameId::Blackjack, QueueClass::Casual, "alice")
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::SearchTimeout));
        assert!(
            matchmaker
                .store()
                .list_open_by_game(GameId::Blackjack)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn cancel_is_idempotent() {
        let matchmaker = matchmaker(Duration::from_secs(5));
        let search = {
            let matchmaker = matchmaker.clone();
            tokio::spawn(async move {
                matchmaker
                    .find_match(GameId::Mastermind, QueueClass::Casual, "alice")
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(matchmaker.cancel_search("alice"));
        assert!(!matchmaker.cancel_search("alice"));
        assert!(matches!(
            search.await.unwrap(),
            Err(SyncError::SearchCancelled)
        ));
    }

    #[tokio::test]
    async fn private_codes_skip_collisions() {
        let matchmaker = matchmaker(Duration::from_secs(1))
            .with_codes(Arc::new(FixedCodes(vec!["AB12", "AB12", "CD34"], Default::default())));
        let first = matchmaker
            .create_private_room(GameId::Poker, "alice")
            .await
            .unwrap();
        let second = matchmaker
            .create_private_room(GameId::Poker, "carol")
            .await
            .unwrap();
        assert_eq!(first.code.as_deref(), Some("AB12"));
        assert_eq!(second.code.as_deref(), Some("CD34"));
    }

    #[tokio::test]
    async fn join_by_code_errors() {
        let matchmaker = matchmaker(Duration::from_secs(1))
            .with_codes(Arc::new(FixedCodes(vec!["AB12"], Default::default())));
        assert!(matches!(
            matchmaker.join_by_code("a!", "bob").await,
            Err(SyncError::InvalidCode(_))
        ));
        assert!(matches!(
            matchmaker.join_by_code("ZZZZ", "bob").await,
            Err(SyncError::RoomNotFound)
        ));

        matchmaker
            .create_private_room(GameId::ConnectFive, "alice")
            .await
            .unwrap();
        let ticket = matchmaker.join_by_code("ab12", "bob").await.unwrap();
        assert_eq!(ticket.player, 2);
        assert!(matches!(
            matchmaker.join_by_code("AB12", "carol").await,
            Err(SyncError::RoomFull(_))
        ));
    }
}
