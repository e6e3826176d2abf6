use futures::executor::block_on;
use promise_chain::{
    CallbackPublisher, Error, InlineExecutor, LogSubscriber, Promise, Publisher, Runner,
    SamplePublisher, Subscriber, Subscription,
};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Request(i64),
    Item(i32),
    Error(String),
    Complete,
}

/// Asks for a growing batch each time: 2, 4, 6, ...
struct Growing {
    times: i64,
    events: Arc<Mutex<Vec<Event>>>,
}

impl Subscriber<i32> for Growing {
    fn on_subscribe(&mut self, subscription: &mut dyn Subscription) {
        self.times += 1;
        let count = self.times * 2;
        self.events.lock().unwrap().push(Event::Request(count));
        subscription.request(count);
    }

    fn on_next(&mut self, item: i32) {
        self.events.lock().unwrap().push(Event::Item(item));
    }

    fn on_error(&mut self, error: Error) {
        self.events.lock().unwrap().push(Event::Error(error.to_string()));
    }

    fn on_complete(&mut self) {
        self.events.lock().unwrap().push(Event::Complete);
    }
}

struct Fixed {
    count: i64,
    cancel_after: Option<usize>,
    subscribed: usize,
    events: Arc<Mutex<Vec<Event>>>,
}

impl Fixed {
    fn new(count: i64, events: &Arc<Mutex<Vec<Event>>>) -> Self {
        Self {
            count,
            cancel_after: None,
            subscribed: 0,
            events: events.clone(),
        }
    }
}

impl Subscriber<i32> for Fixed {
    fn on_subscribe(&mut self, subscription: &mut dyn Subscription) {
        self.subscribed += 1;
        if Some(self.subscribed) == self.cancel_after.map(|n| n + 1) {
            subscription.cancel();
            return;
        }
        subscription.request(self.count);
    }

    fn on_next(&mut self, item: i32) {
        self.events.lock().unwrap().push(Event::Item(item));
    }

    fn on_error(&mut self, error: Error) {
        self.events.lock().unwrap().push(Event::Error(error.to_string()));
    }

    fn on_complete(&mut self) {
        self.events.lock().unwrap().push(Event::Complete);
    }
}

fn events() -> Arc<Mutex<Vec<Event>>> {
    Arc::new(Mutex::new(vec![]))
}

#[test]
fn test_growing_batches() {
    let seen = events();
    let publisher = SamplePublisher::new((0..10).collect::<Vec<i32>>());
    publisher.subscribe(Growing {
        times: 0,
        events: seen.clone(),
    });
    use Event::*;
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            Request(2),
            Item(0),
            Item(1),
            Request(4),
            Item(2),
            Item(3),
            Item(4),
            Item(5),
            Request(6),
            Item(6),
            Item(7),
            Item(8),
            Item(9),
            Complete,
        ]
    );
}

#[test]
fn test_negative_request_is_an_error() {
    let seen = events();
    SamplePublisher::new(vec![1, 2, 3]).subscribe(Fixed::new(-1, &seen));
    assert_eq!(
        *seen.lock().unwrap(),
        vec![Event::Error(String::from(
            "request count must not be negative, got -1"
        ))]
    );
}

#[test]
fn test_exact_batch_completes_once() {
    let seen = events();
    SamplePublisher::new(vec![1, 2, 3]).subscribe(Fixed::new(3, &seen));
    assert_eq!(
        *seen.lock().unwrap(),
        vec![Event::Item(1), Event::Item(2), Event::Item(3), Event::Complete]
    );
}

#[test]
fn test_empty_publisher_completes() {
    let seen = events();
    SamplePublisher::new(Vec::<i32>::new()).subscribe(Fixed::new(5, &seen));
    assert_eq!(*seen.lock().unwrap(), vec![Event::Complete]);
}

#[test]
fn test_cancel_stops_delivery() {
    let seen = events();
    let mut subscriber = Fixed::new(1, &seen);
    subscriber.cancel_after = Some(2);
    SamplePublisher::new(vec![1, 2, 3, 4]).subscribe(subscriber);
    assert_eq!(*seen.lock().unwrap(), vec![Event::Item(1), Event::Item(2)]);
}

#[test]
fn test_log_subscriber_drains_publisher() {
    let _ = env_logger::builder().is_test(true).try_init();
    let publisher = SamplePublisher::new(vec!["rice", "veg", "soup"]);
    publisher.subscribe(LogSubscriber::new(2));
    publisher.subscribe(LogSubscriber::new(-5));
    assert_eq!(publisher.items().len(), 3);
}

#[test]
fn test_zero_request_ends_exchange() {
    let seen = events();
    SamplePublisher::new(vec![1, 2, 3]).subscribe(Fixed::new(0, &seen));
    assert!(seen.lock().unwrap().is_empty());
    SamplePublisher::new(vec!["rice"]).subscribe(LogSubscriber::new(0));
}

#[test]
fn test_sample_publisher_feeds_promise() {
    let promise: Promise<i32> = Runner::default().unresolved();
    let doubled = promise.then_apply_async(|x| x * 2);
    SamplePublisher::new(vec![21, 5, 8]).subscribe(promise.clone());
    assert_eq!(block_on(doubled.completion()).unwrap(), 42);
    assert!(promise.is_success());
}

#[test]
fn test_callback_publisher_pushes_one_item() {
    let seen = events();
    let publisher = CallbackPublisher::new(|| 7).with_executor(InlineExecutor);
    publisher.subscribe(Fixed::new(0, &seen));
    publisher.subscribe(Fixed::new(1, &seen));
    use Event::*;
    assert_eq!(
        *seen.lock().unwrap(),
        vec![Item(7), Complete, Item(7), Complete]
    );
}

#[test]
fn test_callback_publisher_reports_panic() {
    let seen = events();
    CallbackPublisher::new(|| -> i32 { panic!("oven exploded") })
        .with_executor(InlineExecutor)
        .subscribe(Fixed::new(1, &seen));
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            Event::Error(String::from("task panicked: oven exploded")),
            Event::Complete
        ]
    );
}

#[test]
fn test_callback_publisher_resolves_promise_on_worker_thread() {
    let promise: Promise<String> = Runner::default().unresolved();
    CallbackPublisher::new(|| String::from("cooked rice")).subscribe(promise.clone());
    assert_eq!(block_on(promise.completion()).unwrap(), "cooked rice");
}

#[test]
fn test_callback_publisher_error_fails_promise() {
    let promise: Promise<String> = Runner::default().unresolved();
    CallbackPublisher::try_new(|| Err::<String, _>(Error::msg("sold out"))).subscribe(promise.clone());
    assert_eq!(
        block_on(promise.completion()).unwrap_err().to_string(),
        "sold out"
    );
}
