mod buffering;
mod cancel;
mod lifecycle;
mod snapshot;
mod update;
