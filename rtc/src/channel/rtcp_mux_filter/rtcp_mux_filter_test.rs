use super::*;

const RTCP_RR: [u8; 8] = [0x80, 0xC9, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01];
const RTP: [u8; 12] = [0x80, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0, 0, 1];

#[test]
fn test_rtcp_mux_offer_answer() -> Result<()> {
    let mut filter = RtcpMuxFilter::new();
    assert!(!filter.is_active());
    assert!(!filter.demux_rtcp(&RTCP_RR));

    filter.set_offer(true, ContentSource::Local)?;
    assert_eq!(filter.state(), RtcpMuxState::SentOffer);
    assert!(!filter.is_active());
    // demux is possible as soon as the offer went out
    assert!(filter.demux_rtcp(&RTCP_RR));
    assert!(!filter.demux_rtcp(&RTP));

    // a re-offer from the same side is fine, an answer from it is not
    filter.set_offer(true, ContentSource::Local)?;
    assert_eq!(
        filter.set_answer(true, ContentSource::Local),
        Err(Error::ErrRtcpMuxUnexpectedAnswer)
    );

    filter.set_answer(true, ContentSource::Remote)?;
    assert_eq!(filter.state(), RtcpMuxState::Active);
    assert!(filter.is_active());
    Ok(())
}

#[test]
fn test_rtcp_mux_answer_without_mux() -> Result<()> {
    let mut filter = RtcpMuxFilter::new();
    filter.set_offer(true, ContentSource::Remote)?;
    filter.set_answer(false, ContentSource::Local)?;
    assert_eq!(filter.state(), RtcpMuxState::Init);
    assert!(!filter.is_active());
    Ok(())
}

#[test]
fn test_rtcp_mux_not_offered() -> Result<()> {
    let mut filter = RtcpMuxFilter::new();
    filter.set_offer(false, ContentSource::Local)?;
    assert!(!filter.demux_rtcp(&RTCP_RR));
    assert_eq!(
        filter.set_answer(true, ContentSource::Remote),
        Err(Error::ErrRtcpMuxNotOffered)
    );

    let mut filter = RtcpMuxFilter::new();
    filter.set_offer(false, ContentSource::Remote)?;
    assert_eq!(
        filter.set_provisional_answer(true, ContentSource::Local),
        Err(Error::ErrRtcpMuxNotOffered)
    );
    Ok(())
}

#[test]
fn test_rtcp_mux_provisional_answer() -> Result<()> {
    let mut filter = RtcpMuxFilter::new();
    filter.set_offer(true, ContentSource::Local)?;

    filter.set_provisional_answer(true, ContentSource::Remote)?;
    assert_eq!(filter.state(), RtcpMuxState::ReceivedPrAnswer);
    assert!(filter.is_active());

    filter.set_provisional_answer(false, ContentSource::Remote)?;
    assert_eq!(filter.state(), RtcpMuxState::SentOffer);
    assert!(!filter.is_active());

    filter.set_provisional_answer(true, ContentSource::Remote)?;
    filter.set_answer(true, ContentSource::Remote)?;
    assert_eq!(filter.state(), RtcpMuxState::Active);
    Ok(())
}

#[test]
fn test_rtcp_mux_stays_active() -> Result<()> {
    let mut filter = RtcpMuxFilter::new();
    filter.apply(ContentAction::Offer, true, ContentSource::Remote)?;
    filter.apply(ContentAction::Answer, true, ContentSource::Local)?;
    assert!(filter.is_active());

    filter.apply(ContentAction::Update, false, ContentSource::Remote)?;
    assert!(filter.is_active());

    // an answer needs an outstanding offer, even once mux is on
    assert_eq!(
        filter.apply(ContentAction::Answer, false, ContentSource::Remote),
        Err(Error::ErrRtcpMuxUnexpectedAnswer)
    );
    assert_eq!(
        filter.set_provisional_answer(true, ContentSource::Local),
        Err(Error::ErrRtcpMuxUnexpectedAnswer)
    );
    assert_eq!(filter.state(), RtcpMuxState::Active);

    assert_eq!(
        filter.set_offer(false, ContentSource::Local),
        Err(Error::ErrRtcpMuxUnexpectedOffer)
    );
    assert!(filter.is_active());
    Ok(())
}

#[test]
fn test_rtcp_mux_reoffer_while_active() -> Result<()> {
    let mut filter = RtcpMuxFilter::new();
    filter.set_offer(true, ContentSource::Local)?;
    filter.set_answer(true, ContentSource::Remote)?;

    filter.set_offer(true, ContentSource::Remote)?;
    assert_eq!(filter.state(), RtcpMuxState::ReceivedOffer);
    assert!(filter.demux_rtcp(&RTCP_RR));
    filter.set_answer(true, ContentSource::Local)?;
    assert_eq!(filter.state(), RtcpMuxState::Active);
    Ok(())
}
