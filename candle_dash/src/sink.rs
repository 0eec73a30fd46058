use crate::candles::Candle;
use crate::debug_hooks;
use crate::markers::Marker;

/// The chart widget as the engine sees it. Calls arrive in the order they must be
/// rendered; `replace_all` always gets an ascending, duplicate-free series.
pub trait ChartSink {
    fn replace_all(&mut self, candles: &[Candle]);
    fn upsert_last(&mut self, candle: &Candle);
    fn set_markers(&mut self, markers: &[Marker]);
    fn fit_visible_range(&mut self);
    fn set_price_auto_scale(&mut self, enabled: bool);
}

/// Headless sink: keeps the series it was given and reports every mutation through
/// the debug hooks.
#[derive(Debug, Default)]
pub struct LogSink {
    series: Vec<Candle>,
    auto_scale: bool,
}

impl ChartSink for LogSink {
    fn replace_all(&mut self, candles: &[Candle]) {
        self.series = candles.to_vec();
        debug_hooks::log_chart_replace(&self.series);
    }

    fn upsert_last(&mut self, candle: &Candle) {
        crate::candles::upsert_trailing(&mut self.series, *candle);
        debug_hooks::log_chart_upsert(candle);
    }

    fn set_markers(&mut self, markers: &[Marker]) {
        debug_hooks::log_chart_markers(markers);
    }

    fn fit_visible_range(&mut self) {
        debug_hooks::log_chart_view(format!("fit to {} candles", self.series.len()));
    }

    fn set_price_auto_scale(&mut self, enabled: bool) {
        if self.auto_scale != enabled {
            self.auto_scale = enabled;
            debug_hooks::log_chart_view(format!("price auto-scale {enabled}"));
        }
    }
}
