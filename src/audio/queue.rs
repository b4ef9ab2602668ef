use serde::Serialize;
use std::collections::VecDeque;
use tracing::{debug, info};

use crate::sources::Song;

/// Modo de repetición de un guild. Un solo valor a la vez: activar uno apaga el otro.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopMode {
    #[default]
    Off,
    Queue,
    Song,
}

impl LoopMode {
    pub fn label(&self) -> &'static str {
        match self {
            LoopMode::Off => "❌ Desactivado",
            LoopMode::Queue => "🔁 Cola",
            LoopMode::Song => "🔂 Canción",
        }
    }
}

/// Estado de la cola de un guild.
///
/// `pending` es FIFO, `current` es lo que suena (o está pausado) ahora y
/// `backup` guarda la rotación completa mientras el loop de cola está activo.
/// Todas las operaciones son síncronas y aplican sus cambios completos.
#[derive(Debug, Default)]
pub struct QueueState {
    pending: VecDeque<Song>,
    current: Option<Song>,
    backup: Vec<Song>,
    loop_mode: LoopMode,
}

impl QueueState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Agrega una canción al final de la cola
    pub fn add_to_queue(&mut self, song: Song) {
        info!("➕ Agregado a la cola: {}", song.title());
        self.pending.push_back(song);
    }

    /// Vacía la cola, el backup y la canción actual
    pub fn clear_queue(&mut self) {
        self.pending.clear();
        self.backup.clear();
        self.current = None;
        info!("🗑️ Cola limpiada");
    }

    /// Obtiene la siguiente canción (FIFO), reponiendo desde el backup en loop de cola
    pub fn get_next_song(&mut self) -> Option<Song> {
        if self.pending.is_empty() {
            let looping = self.loop_mode == LoopMode::Queue;
            if looping && !self.backup.is_empty() {
                debug!("🔁 Reiniciando rotación con {} canciones", self.backup.len());
                self.pending = self.backup.iter().cloned().collect();
            } else if looping && self.current.is_some() {
                // Rotación degenerada de una sola canción
                self.pending.extend(self.current.clone());
            } else {
                info!("📭 Cola vacía, no hay siguiente canción");
                self.current = None;
                return None;
            }
        }

        let next = self.pending.pop_front()?;

        if self.loop_mode == LoopMode::Queue && !self.backup.contains(&next) {
            self.backup.push(next.clone());
        }

        info!("➡️ Siguiente en cola: {}", next.title());
        self.current = Some(next.clone());
        Some(next)
    }

    /// Se llama cuando una canción termina sola (no por skip)
    pub fn song_finished(&mut self) -> Option<Song> {
        if self.loop_mode == LoopMode::Song {
            if let Some(current) = &self.current {
                info!("🔂 Repitiendo canción: {}", current.title());
                return Some(current.clone());
            }
        }

        self.get_next_song()
    }

    /// Salta la canción actual. Un skip siempre rompe el loop de canción.
    pub fn skip_current(&mut self) -> Option<Song> {
        if self.loop_mode == LoopMode::Song {
            info!("➡️ Loop de canción desactivado por skip");
            self.loop_mode = LoopMode::Off;
        }

        // Las canciones pendientes tienen prioridad sobre reiniciar la rotación
        if !self.pending.is_empty() {
            return self.get_next_song();
        }

        if self.loop_mode == LoopMode::Queue {
            let current = self.current.as_ref();
            self.pending = self
                .backup
                .iter()
                .filter(|song| Some(*song) != current)
                .cloned()
                .collect();
            return self.get_next_song();
        }

        self.current = None;
        None
    }

    /// Activa/desactiva el loop de cola. Devuelve el nuevo estado.
    pub fn toggle_loop_queue(&mut self) -> bool {
        if self.loop_mode == LoopMode::Queue {
            self.loop_mode = LoopMode::Off;
            self.backup.clear();
            info!("➡️ Repetir cola desactivado");
            return false;
        }

        self.loop_mode = LoopMode::Queue;
        self.backup = self.pending.iter().cloned().collect();
        if let Some(current) = &self.current {
            if !self.backup.contains(current) {
                self.backup.push(current.clone());
            }
        }
        info!("🔁 Repetir cola activado ({} canciones en rotación)", self.backup.len());
        true
    }

    /// Activa/desactiva el loop de canción. No toca `pending` ni `backup`.
    pub fn toggle_loop_song(&mut self) -> bool {
        if self.loop_mode == LoopMode::Song {
            self.loop_mode = LoopMode::Off;
            info!("➡️ Repetir canción desactivado");
            false
        } else {
            self.loop_mode = LoopMode::Song;
            info!("🔂 Repetir canción activado");
            true
        }
    }

    pub fn current(&self) -> Option<&Song> {
        self.current.as_ref()
    }

    /// Copia de la cola pendiente; nunca la lista viva
    pub fn snapshot(&self) -> Vec<Song> {
        self.pending.iter().cloned().collect()
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Cuántas canciones distintas pueden salir de `get_next_song` antes de
    /// repetir una (con loop de cola la rotación vuelve a empezar)
    pub fn rotation_len(&self) -> usize {
        self.pending.len().max(self.backup.len()) + 1
    }

    /// Estado completo para la UI y el dashboard
    pub fn info(&self) -> QueueSnapshot {
        QueueSnapshot {
            current: self.current.clone(),
            pending: self.snapshot(),
            loop_mode: self.loop_mode,
        }
    }

    #[cfg(test)]
    fn backup(&self) -> &[Song] {
        &self.backup
    }
}

/// Foto de solo lectura de la cola de un guild.
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    pub current: Option<Song>,
    pub pending: Vec<Song>,
    pub loop_mode: LoopMode,
}

impl QueueSnapshot {
    /// Primeros `limit` elementos y cuántos quedan fuera
    pub fn truncated(&self, limit: usize) -> (&[Song], usize) {
        let shown = self.pending.len().min(limit);
        (&self.pending[..shown], self.pending.len() - shown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn song(name: &str) -> Song {
        Song::new(name.to_string(), format!("https://youtu.be/{name}"))
    }

    fn titles(songs: &[Song]) -> Vec<String> {
        songs.iter().map(|s| s.title().to_string()).collect()
    }

    fn current_title(queue: &QueueState) -> Option<String> {
        queue.current().map(|s| s.title().to_string())
    }

    #[test]
    fn add_to_queue_keeps_fifo_order() {
        let mut queue = QueueState::new();
        for name in ["a", "b", "c", "d"] {
            queue.add_to_queue(song(name));
        }

        assert_eq!(queue.len(), 4);
        assert_eq!(titles(&queue.snapshot()), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn next_song_on_empty_queue_clears_current() {
        let mut queue = QueueState::new();
        assert!(queue.get_next_song().is_none());
        assert!(queue.current().is_none());
    }

    #[test]
    fn dequeues_in_order_until_exhausted() {
        let mut queue = QueueState::new();
        queue.add_to_queue(song("a"));
        queue.add_to_queue(song("b"));

        assert_eq!(queue.get_next_song(), Some(song("a")));
        assert_eq!(current_title(&queue).as_deref(), Some("a"));
        assert_eq!(titles(&queue.snapshot()), vec!["b"]);

        assert_eq!(queue.get_next_song(), Some(song("b")));
        assert_eq!(current_title(&queue).as_deref(), Some("b"));
        assert!(queue.snapshot().is_empty());

        assert_eq!(queue.get_next_song(), None);
        assert!(queue.current().is_none());
    }

    #[test]
    fn song_loop_replays_without_touching_lists() {
        let mut queue = QueueState::new();
        queue.add_to_queue(song("a"));
        queue.add_to_queue(song("b"));
        queue.get_next_song();
        assert!(queue.toggle_loop_song());

        for _ in 0..5 {
            assert_eq!(queue.song_finished(), Some(song("a")));
            assert_eq!(titles(&queue.snapshot()), vec!["b"]);
            assert!(queue.backup().is_empty());
        }
    }

    #[test]
    fn queue_loop_rotation_never_loses_songs() {
        let mut queue = QueueState::new();
        queue.add_to_queue(song("a"));
        queue.add_to_queue(song("b"));

        assert!(queue.toggle_loop_queue());
        assert_eq!(titles(queue.backup()), vec!["a", "b"]);

        assert_eq!(queue.get_next_song(), Some(song("a")));
        assert_eq!(titles(&queue.snapshot()), vec!["b"]);

        for _ in 0..3 {
            assert_eq!(queue.song_finished(), Some(song("b")));
            assert!(queue.snapshot().is_empty());

            assert_eq!(queue.song_finished(), Some(song("a")));
            assert_eq!(titles(&queue.snapshot()), vec!["b"]);
            assert_eq!(current_title(&queue).as_deref(), Some("a"));
        }
        assert_eq!(titles(queue.backup()), vec!["a", "b"]);
    }

    #[test]
    fn queue_loop_includes_current_and_songs_added_mid_rotation() {
        let mut queue = QueueState::new();
        queue.add_to_queue(song("a"));
        queue.get_next_song();
        queue.add_to_queue(song("b"));

        queue.toggle_loop_queue();
        assert_eq!(titles(queue.backup()), vec!["b", "a"]);

        queue.add_to_queue(song("c"));
        assert_eq!(queue.song_finished(), Some(song("b")));
        assert_eq!(queue.song_finished(), Some(song("c")));
        assert_eq!(titles(queue.backup()), vec!["b", "a", "c"]);

        assert_eq!(queue.song_finished(), Some(song("b")));
        assert_eq!(titles(&queue.snapshot()), vec!["a", "c"]);
    }

    #[test]
    fn queue_loop_with_only_current_repeats_it() {
        let mut queue = QueueState::new();
        queue.add_to_queue(song("a"));
        queue.get_next_song();
        queue.toggle_loop_queue();
        queue.toggle_loop_queue();
        queue.toggle_loop_queue();

        assert_eq!(queue.song_finished(), Some(song("a")));
        assert_eq!(queue.song_finished(), Some(song("a")));
    }

    #[test]
    fn skip_always_breaks_song_loop() {
        let mut queue = QueueState::new();
        queue.add_to_queue(song("a"));
        queue.add_to_queue(song("b"));
        queue.get_next_song();
        queue.toggle_loop_song();

        assert_eq!(queue.skip_current(), Some(song("b")));
        assert_ne!(queue.loop_mode(), LoopMode::Song);

        queue.toggle_loop_song();
        assert_eq!(queue.skip_current(), None);
        assert_eq!(queue.loop_mode(), LoopMode::Off);
        assert!(queue.current().is_none());
    }

    #[test]
    fn skip_prefers_pending_over_restarting_rotation() {
        let mut queue = QueueState::new();
        queue.add_to_queue(song("a"));
        queue.add_to_queue(song("b"));
        queue.add_to_queue(song("c"));
        queue.toggle_loop_queue();
        queue.get_next_song();

        assert_eq!(queue.skip_current(), Some(song("b")));
        assert_eq!(titles(&queue.snapshot()), vec!["c"]);
    }

    #[test]
    fn skip_under_queue_loop_does_not_replay_skipped_song() {
        let mut queue = QueueState::new();
        queue.add_to_queue(song("a"));
        queue.add_to_queue(song("b"));
        queue.add_to_queue(song("c"));
        queue.toggle_loop_queue();
        queue.get_next_song();
        queue.get_next_song();
        queue.get_next_song();
        assert_eq!(current_title(&queue).as_deref(), Some("c"));

        assert_eq!(queue.skip_current(), Some(song("a")));
        assert_eq!(titles(&queue.snapshot()), vec!["b"]);
        assert_eq!(titles(queue.backup()), vec!["a", "b", "c"]);
    }

    #[test]
    fn skip_without_loop_on_empty_queue_stops() {
        let mut queue = QueueState::new();
        queue.add_to_queue(song("a"));
        queue.get_next_song();

        assert_eq!(queue.skip_current(), None);
        assert!(queue.current().is_none());
    }

    #[test]
    fn toggling_queue_loop_twice_turns_it_off_and_empties_backup() {
        let mut queue = QueueState::new();
        queue.add_to_queue(song("a"));

        assert!(queue.toggle_loop_queue());
        assert!(!queue.toggle_loop_queue());
        assert_eq!(queue.loop_mode(), LoopMode::Off);
        assert!(queue.backup().is_empty());
    }

    #[test]
    fn loop_modes_are_mutually_exclusive() {
        let mut queue = QueueState::new();
        queue.toggle_loop_queue();
        assert!(queue.toggle_loop_song());
        assert_eq!(queue.loop_mode(), LoopMode::Song);

        assert!(queue.toggle_loop_queue());
        assert_eq!(queue.loop_mode(), LoopMode::Queue);
    }

    #[test]
    fn rotation_len_covers_a_full_queue_loop() {
        let mut queue = QueueState::new();
        for name in ["a", "b", "c"] {
            queue.add_to_queue(song(name));
        }
        assert_eq!(queue.rotation_len(), 4);

        queue.toggle_loop_queue();
        queue.get_next_song();
        queue.get_next_song();

        // Quedan 1 pendiente y 3 en el backup
        assert_eq!(queue.rotation_len(), 4);
    }

    #[test]
    fn clear_empties_everything() {
        let mut queue = QueueState::new();
        queue.add_to_queue(song("a"));
        queue.add_to_queue(song("b"));
        queue.toggle_loop_queue();
        queue.get_next_song();

        queue.clear_queue();
        assert_eq!(queue.len(), 0);
        assert!(queue.current().is_none());
        assert!(queue.backup().is_empty());
        assert_eq!(queue.rotation_len(), 1);
    }

    #[test]
    fn snapshot_truncates_for_display() {
        let mut queue = QueueState::new();
        for i in 0..13 {
            queue.add_to_queue(song(&format!("s{i}")));
        }

        let info = queue.info();
        let (shown, remaining) = info.truncated(10);
        assert_eq!(shown.len(), 10);
        assert_eq!(remaining, 3);
    }
}
