use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use log::debug;

use crate::config::{Endpoint, SessionOptions};
use crate::platform::{Attempt, Platform, PlatformEvent, TimerId, VideoSink};
use crate::restart::StopSignal;
use crate::supervisor::{ReconnectSupervisor, SupervisorState};

enum Command<S> {
    Start(Endpoint),
    Stop,
    Event(Attempt, PlatformEvent<S>),
    RestartDue(TimerId),
}

trait Dispatch<S> {
    fn dispatch(&self, command: Command<S>);
}

/// Given to a [`Platform`] to report completed operations back.
///
/// Holds only a weak reference; events sent after the owning
/// [`CamViewHandle`] is gone are dropped.
pub struct EventSender<S> {
    target: Weak<dyn Dispatch<S>>,
}

impl<S> Clone for EventSender<S> {
    fn clone(&self) -> Self {
        Self {
            target: Weak::clone(&self.target),
        }
    }
}

impl<S> EventSender<S> {
    pub fn send(&self, attempt: Attempt, event: PlatformEvent<S>) {
        self.deliver(Command::Event(attempt, event));
    }

    /// The restart timer `timer` fired.
    pub fn restart_due(&self, timer: TimerId) {
        self.deliver(Command::RestartDue(timer));
    }

    fn deliver(&self, command: Command<S>) {
        match self.target.upgrade() {
            Some(target) => target.dispatch(command),
            None => debug!("camera view dropped, discarding event"),
        }
    }
}

struct Inner<P: Platform, V> {
    supervisor: RefCell<ReconnectSupervisor<P, V>>,
    queue: RefCell<VecDeque<Command<P::Stream>>>,
    stop_signal: StopSignal,
}

impl<P, V> Inner<P, V>
where
    P: Platform,
    V: VideoSink<Stream = P::Stream>,
{
    /// Run queued commands unless an outer call is already doing so.
    fn drain(&self) {
        let Ok(mut supervisor) = self.supervisor.try_borrow_mut() else {
            return;
        };
        loop {
            let next = self.queue.borrow_mut().pop_front();
            let Some(command) = next else {
                break;
            };
            match command {
                Command::Start(endpoint) => supervisor.start(endpoint),
                Command::Stop => {
                    supervisor.stop();
                    self.stop_signal.acknowledge();
                }
                Command::Event(attempt, event) => supervisor.handle_event(attempt, event),
                Command::RestartDue(timer) => supervisor.on_restart_due(timer),
            }
        }
    }
}

impl<P, V> Dispatch<P::Stream> for Inner<P, V>
where
    P: Platform,
    V: VideoSink<Stream = P::Stream>,
{
    fn dispatch(&self, command: Command<P::Stream>) {
        if matches!(command, Command::Stop) {
            self.stop_signal.request();
        }
        self.queue.borrow_mut().push_back(command);
        self.drain();
    }
}

/// Single entry point into a [`ReconnectSupervisor`].
///
/// Commands from the owner and events from the platform are queued and run
/// one at a time, so a callback that fires while another one is being handled
/// (a sink calling [`Self::stop`] from `detach`, for instance) is processed
/// right after it instead of re-entering the supervisor. A stop request takes
/// effect on any restart decision made while it is queued.
pub struct CamViewHandle<P: Platform, V> {
    inner: Rc<Inner<P, V>>,
}

impl<P: Platform, V> Clone for CamViewHandle<P, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<P, V> CamViewHandle<P, V>
where
    P: Platform + 'static,
    V: VideoSink<Stream = P::Stream> + 'static,
    P::Stream: 'static,
{
    /// `make_platform` receives the sender the platform reports events with.
    pub fn new<F>(options: SessionOptions, sink: V, make_platform: F) -> Self
    where
        F: FnOnce(EventSender<P::Stream>) -> P,
    {
        let inner = Rc::new_cyclic(|weak: &Weak<Inner<P, V>>| {
            let target: Weak<dyn Dispatch<P::Stream>> = weak.clone();
            let platform = make_platform(EventSender { target });
            let supervisor = ReconnectSupervisor::new(platform, sink, options);
            let stop_signal = supervisor.stop_signal();
            Inner {
                supervisor: RefCell::new(supervisor),
                queue: RefCell::new(VecDeque::new()),
                stop_signal,
            }
        });
        Self { inner }
    }

    pub fn start(&self, endpoint: Endpoint) {
        self.inner.dispatch(Command::Start(endpoint));
    }

    pub fn stop(&self) {
        self.inner.dispatch(Command::Stop);
    }

    pub fn events(&self) -> EventSender<P::Stream> {
        let weak: Weak<Inner<P, V>> = Rc::downgrade(&self.inner);
        let target: Weak<dyn Dispatch<P::Stream>> = weak;
        EventSender { target }
    }

    /// `None` while called from inside the supervisor.
    pub fn state(&self) -> Option<SupervisorState> {
        self.with_supervisor(ReconnectSupervisor::state)
    }

    /// `None` while called from inside the supervisor. Commands issued by `f`
    /// run once it returns.
    pub fn with_supervisor<R>(
        &self,
        f: impl FnOnce(&ReconnectSupervisor<P, V>) -> R,
    ) -> Option<R> {
        let result = self
            .inner
            .supervisor
            .try_borrow()
            .ok()
            .map(|supervisor| f(&supervisor));
        self.inner.drain();
        result
    }
}
