use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RageClick {
    pub x: f64,
    pub y: f64,
    pub clicks: usize,
}

/// Sliding window of recent clicks. Fires when the window holds `count`
/// clicks all within `radius` of the oldest one, then starts over.
#[derive(Debug, Clone)]
pub struct RageClickDetector {
    window_ms: f64,
    radius: f64,
    count: usize,
    clicks: VecDeque<(f64, f64, f64)>,
}

impl RageClickDetector {
    pub fn new(window_ms: u64, radius: f64, count: usize) -> Self {
        Self {
            window_ms: window_ms as f64,
            radius,
            count: count.max(2),
            clicks: VecDeque::new(),
        }
    }

    pub fn on_click(&mut self, now: f64, x: f64, y: f64) -> Option<RageClick> {
        self.clicks.push_back((now, x, y));
        while let Some(&(t, _, _)) = self.clicks.front() {
            if now - t > self.window_ms {
                self.clicks.pop_front();
            } else {
                break;
            }
        }
        if self.clicks.len() < self.count {
            return None;
        }

        let (_, fx, fy) = self.clicks[0];
        let close = self
            .clicks
            .iter()
            .all(|&(_, cx, cy)| ((cx - fx).powi(2) + (cy - fy).powi(2)).sqrt() <= self.radius);
        if !close {
            return None;
        }
        let clicks = self.clicks.len();
        self.clicks.clear();
        Some(RageClick { x, y, clicks })
    }

    pub fn reset(&mut self) {
        self.clicks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> RageClickDetector {
        RageClickDetector::new(500, 30.0, 3)
    }

    #[test]
    fn test_three_close_clicks_fire_once() {
        let mut d = detector();
        assert_eq!(d.on_click(0.0, 100.0, 100.0), None);
        assert_eq!(d.on_click(100.0, 105.0, 98.0), None);
        let hit = d.on_click(200.0, 110.0, 110.0).unwrap();
        assert_eq!(hit.clicks, 3);
        assert_eq!((hit.x, hit.y), (110.0, 110.0));

        // window was cleared: a fourth nearby click does not fire again
        assert_eq!(d.on_click(250.0, 101.0, 101.0), None);
        assert_eq!(d.on_click(300.0, 101.0, 101.0), None);
        assert!(d.on_click(350.0, 101.0, 101.0).is_some());
    }

    #[test]
    fn test_slow_clicks_fall_out_of_window() {
        let mut d = detector();
        d.on_click(0.0, 10.0, 10.0);
        d.on_click(400.0, 10.0, 10.0);
        assert_eq!(d.on_click(900.0, 10.0, 10.0), None);
    }

    #[test]
    fn test_spread_out_clicks_do_not_fire() {
        let mut d = detector();
        d.on_click(0.0, 0.0, 0.0);
        d.on_click(50.0, 40.0, 0.0);
        assert_eq!(d.on_click(100.0, 0.0, 0.0), None);
    }
}
