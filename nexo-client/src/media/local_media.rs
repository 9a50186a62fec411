use crate::media::{MediaTrack, TrackSource};

/// What the UI renders as the local preview.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalStream {
    pub audio: Option<MediaTrack>,
    pub video: Option<MediaTrack>,
}

/// Current outbound capture sources.
///
/// The outbound video is the screen while sharing, otherwise the camera;
/// there is never more than one video track to bind.
#[derive(Debug, Default)]
pub struct LocalMediaState {
    camera: Option<MediaTrack>,
    microphone: Option<MediaTrack>,
    screen: Option<MediaTrack>,
}

impl LocalMediaState {
    pub fn new(camera: Option<MediaTrack>, microphone: Option<MediaTrack>) -> Self {
        Self {
            camera,
            microphone,
            screen: None,
        }
    }

    pub fn camera(&self) -> Option<&MediaTrack> {
        self.camera.as_ref()
    }

    pub fn microphone(&self) -> Option<&MediaTrack> {
        self.microphone.as_ref()
    }

    pub fn screen(&self) -> Option<&MediaTrack> {
        self.screen.as_ref()
    }

    pub fn set_camera(&mut self, track: Option<MediaTrack>) {
        self.camera = track;
    }

    pub fn set_microphone(&mut self, track: Option<MediaTrack>) {
        self.microphone = track;
    }

    /// Substitute the screen for the camera. Returns the previous screen track.
    pub fn start_screen(&mut self, track: MediaTrack) -> Option<MediaTrack> {
        self.screen.replace(track)
    }

    pub fn stop_screen(&mut self) -> Option<MediaTrack> {
        self.screen.take()
    }

    pub fn active_video(&self) -> Option<&MediaTrack> {
        self.screen.as_ref().or(self.camera.as_ref())
    }

    /// Tracks every peer connection must send, at most one per kind.
    pub fn outbound_tracks(&self) -> Vec<MediaTrack> {
        self.microphone
            .iter()
            .chain(self.active_video())
            .cloned()
            .collect()
    }

    pub fn mic_enabled(&self) -> bool {
        self.microphone.as_ref().is_some_and(MediaTrack::is_enabled)
    }

    /// Flip the enabled flag of the camera or microphone.
    ///
    /// Returns the new flag, or `None` when there is no such device.
    pub fn toggle(&mut self, source: TrackSource) -> Option<bool> {
        let track = match source {
            TrackSource::Camera => self.camera.as_ref(),
            TrackSource::Microphone => self.microphone.as_ref(),
            TrackSource::Screen => self.screen.as_ref(),
        }?;
        let enabled = !track.is_enabled();
        track.set_enabled(enabled);
        Some(enabled)
    }

    pub fn stop_all(&mut self) {
        for track in [self.camera.take(), self.microphone.take(), self.screen.take()]
            .into_iter()
            .flatten()
        {
            track.stop();
        }
    }

    pub fn local_stream(&self) -> LocalStream {
        LocalStream {
            audio: self.microphone.clone(),
            video: self.active_video().cloned(),
        }
    }
}
