pub mod ms {
    pub const POLL_INTERVAL: u64 = 100;
    pub const READY_SETTLE: u64 = 50;
    pub const OBSTACLE_DETECT: u64 = 2000;
    pub const OBSTACLE_CONFIRM: u64 = 5000;
    pub const OBSTACLE_BACKOFF: u64 = 1000;
    pub const NEXT_CONTROL: u64 = 5000;
    pub const ADVANCE: u64 = 10000;
    pub const CONTENT_WAIT: u64 = 10000;
    pub const NAVIGATION_BACKOFF: u64 = 2000;
    pub const LAZY_SETTLE: u64 = 3000;
    pub const DELAY_MIN: u64 = 2000;
    pub const DELAY_MAX: u64 = 4000;
}

pub mod secs {
    pub const READY_STATE: u64 = 5;
    pub const NAVIGATION: u64 = 30;
    pub const REQUEST: u64 = 120;
}
