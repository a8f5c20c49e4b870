//! Raspberry Pi back-end: hardware PWM H-bridge and interrupt-driven quadrature inputs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rcdrive_traits::{DriveOutput, DutyPair, EncoderChannel, HwResult, PulseSink};
use rppal::gpio::{Gpio, InputPin, Level, Trigger};
use rppal::pwm::{Channel, Polarity, Pwm};

use crate::error::{HwError, Result};

fn channel(n: u8) -> Result<Channel> {
    match n {
        0 => Ok(Channel::Pwm0),
        1 => Ok(Channel::Pwm1),
        other => Err(HwError::Pwm(format!("no hardware PWM channel {other}"))),
    }
}

fn open(n: u8, frequency_hz: f64) -> Result<Pwm> {
    Pwm::with_frequency(channel(n)?, frequency_hz, 0.0, Polarity::Normal, true)
        .map_err(|e| HwError::Pwm(e.to_string()))
}

/// Two PWM channels feeding the forward and reverse inputs of the bridge.
pub struct PwmBridge {
    forward: Pwm,
    reverse: Pwm,
}

impl PwmBridge {
    pub fn new(forward_channel: u8, reverse_channel: u8, frequency_hz: f64) -> Result<Self> {
        if forward_channel == reverse_channel {
            return Err(HwError::Pwm("forward and reverse share a channel".into()));
        }
        let bridge = Self {
            forward: open(forward_channel, frequency_hz)?,
            reverse: open(reverse_channel, frequency_hz)?,
        };
        tracing::info!(forward_channel, reverse_channel, frequency_hz, "pwm bridge ready");
        Ok(bridge)
    }

    fn write(&self, duty: DutyPair) -> Result<()> {
        let scale = |d: u16| f64::from(d) / f64::from(u16::MAX);
        // release one side before driving the other
        let (idle, active, active_duty) = if duty.forward == 0 {
            (&self.forward, &self.reverse, duty.reverse)
        } else {
            (&self.reverse, &self.forward, duty.forward)
        };
        idle.set_duty_cycle(0.0)
            .map_err(|e| HwError::Pwm(e.to_string()))?;
        active
            .set_duty_cycle(scale(active_duty))
            .map_err(|e| HwError::Pwm(e.to_string()))
    }
}

impl DriveOutput for PwmBridge {
    fn set_duty(&mut self, duty: DutyPair) -> HwResult<()> {
        Ok(self.write(duty)?)
    }
}

impl Drop for PwmBridge {
    fn drop(&mut self) {
        if let Err(e) = self.write(DutyPair::ZERO) {
            tracing::error!(error = %e, "failed to zero pwm bridge on drop");
        }
    }
}

/// Keeps both encoder pins alive; interrupts stop when this is dropped.
pub struct QuadratureInputs {
    _a: InputPin,
    _b: InputPin,
}

/// Register async interrupts on both edges of both encoder channels.
///
/// Each callback gets its own level; the other channel's level comes from
/// the last edge seen on it.
pub fn attach_quadrature(
    pin_a: u8,
    pin_b: u8,
    sink: Arc<dyn PulseSink>,
) -> Result<QuadratureInputs> {
    let gpio = Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
    let mut a = gpio
        .get(pin_a)
        .map_err(|e| HwError::Gpio(e.to_string()))?
        .into_input_pullup();
    let mut b = gpio
        .get(pin_b)
        .map_err(|e| HwError::Gpio(e.to_string()))?
        .into_input_pullup();

    let level_a = Arc::new(AtomicBool::new(a.is_high()));
    let level_b = Arc::new(AtomicBool::new(b.is_high()));

    {
        let (la, lb, sink) = (level_a.clone(), level_b.clone(), sink.clone());
        a.set_async_interrupt(Trigger::Both, move |level: Level| {
            let high = level == Level::High;
            la.store(high, Ordering::Relaxed);
            sink.on_edge(EncoderChannel::A, high, lb.load(Ordering::Relaxed));
        })
        .map_err(|e| HwError::Gpio(e.to_string()))?;
    }
    {
        let (la, lb) = (level_a, level_b);
        b.set_async_interrupt(Trigger::Both, move |level: Level| {
            let high = level == Level::High;
            lb.store(high, Ordering::Relaxed);
            sink.on_edge(EncoderChannel::B, la.load(Ordering::Relaxed), high);
        })
        .map_err(|e| HwError::Gpio(e.to_string()))?;
    }

    tracing::info!(pin_a, pin_b, "quadrature interrupts attached");
    Ok(QuadratureInputs { _a: a, _b: b })
}
